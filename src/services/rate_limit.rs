use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::AppConfig;

/// Action classes guarded by the limiter. Each class carries its own
/// `{points, window}` budget; a window is keyed by `(class, identifier)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Presign and finalize calls: low budget, long window
    Upload,
    /// Everything without a dedicated class: moderate budget, short window
    Default,
    /// Access-code unlock attempts: low budget, long window
    Auth,
    /// Share resolution and downloads: higher budget, short window
    Check,
}

impl ActionClass {
    pub fn key(&self) -> &'static str {
        match self {
            ActionClass::Upload => "upload",
            ActionClass::Default => "default",
            ActionClass::Auth => "auth",
            ActionClass::Check => "check",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassBudget {
    pub points: u32,
    pub window_secs: u64,
}

/// Outcome of a single attempt. Every evaluated attempt consumes exactly one
/// point, including denied ones.
#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

#[derive(Error, Debug)]
pub enum LimiterError {
    /// The shared counter store could not be reached. Callers must treat this
    /// as a 5xx and reject the action; the limiter never fails open.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Shared counter primitive: atomic increment with a window that starts on
/// the first hit and evicts at expiry (fixed window, no decrement).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments `key`, returns the post-increment count and the time
    /// remaining until the window resets.
    async fn incr(&self, key: &str, window: Duration) -> Result<(u64, Duration), LimiterError>;
}

/// Redis-backed store shared across all process instances.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager, op_timeout: Duration) -> Self {
        Self { conn, op_timeout }
    }

    async fn incr_inner(&self, key: &str, window: Duration) -> redis::RedisResult<(u64, Duration)> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1u64).await?;
        if count == 1 {
            let _: i64 = conn.expire(key, window.as_secs() as i64).await?;
        }
        let mut ttl: i64 = conn.ttl(key).await?;
        if ttl < 0 {
            // Expiry was lost (flush, eviction); restart the window.
            let _: i64 = conn.expire(key, window.as_secs() as i64).await?;
            ttl = window.as_secs() as i64;
        }
        Ok((count, Duration::from_secs(ttl as u64)))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<(u64, Duration), LimiterError> {
        match tokio::time::timeout(self.op_timeout, self.incr_inner(key, window)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(LimiterError::Unavailable(e.to_string())),
            Err(_) => Err(LimiterError::Unavailable(format!(
                "redis call timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

struct WindowSlot {
    count: u64,
    reset_at: Instant,
}

/// In-process store for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryCounterStore {
    slots: DashMap<String, WindowSlot>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<(u64, Duration), LimiterError> {
        let now = Instant::now();
        let mut slot = self.slots.entry(key.to_string()).or_insert(WindowSlot {
            count: 0,
            reset_at: now + window,
        });

        if now >= slot.reset_at {
            slot.count = 0;
            slot.reset_at = now + window;
        }

        slot.count += 1;
        let remaining = slot.reset_at.saturating_duration_since(now);
        Ok((slot.count, remaining))
    }
}

/// Fixed-window limiter over a shared counter store. Constructed once at
/// startup and passed by reference through the application state; there is
/// one budget per action class.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    upload: ClassBudget,
    default: ClassBudget,
    auth: ClassBudget,
    check: ClassBudget,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: &AppConfig) -> Self {
        Self {
            store,
            upload: ClassBudget {
                points: config.upload_points,
                window_secs: config.upload_window_secs,
            },
            default: ClassBudget {
                points: config.default_points,
                window_secs: config.default_window_secs,
            },
            auth: ClassBudget {
                points: config.auth_points,
                window_secs: config.auth_window_secs,
            },
            check: ClassBudget {
                points: config.check_points,
                window_secs: config.check_window_secs,
            },
        }
    }

    pub fn budget(&self, class: ActionClass) -> ClassBudget {
        match class {
            ActionClass::Upload => self.upload,
            ActionClass::Default => self.default,
            ActionClass::Auth => self.auth,
            ActionClass::Check => self.check,
        }
    }

    /// Consumes one point for `(class, identifier)` and decides the attempt.
    pub async fn attempt(
        &self,
        class: ActionClass,
        identifier: &str,
    ) -> Result<Decision, LimiterError> {
        let budget = self.budget(class);
        let key = format!("rl:{}:{}", class.key(), identifier);
        let (count, remaining_window) = self
            .store
            .incr(&key, Duration::from_secs(budget.window_secs))
            .await?;

        if count <= budget.points as u64 {
            Ok(Decision::Allowed {
                remaining: budget.points - count as u32,
            })
        } else {
            tracing::debug!(
                class = class.key(),
                identifier,
                count,
                "rate limit exceeded"
            );
            Ok(Decision::Denied {
                retry_after: remaining_window,
            })
        }
    }
}
