use crate::config::AppConfig;
use crate::services::rate_limit::{CounterStore, MemoryCounterStore, RedisCounterStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds the shared counter store for the rate limiter. With a REDIS_URL the
/// counters are shared across all process instances; without one they live in
/// process memory, which is only sound for single-instance deployments.
pub async fn setup_counter_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CounterStore>> {
    match &config.redis_url {
        Some(url) => {
            info!("🔢 Rate-limit counters: redis");
            let client = redis::Client::open(url.as_str())?;
            let conn = client.get_connection_manager().await?;
            Ok(Arc::new(RedisCounterStore::new(
                conn,
                Duration::from_secs(config.external_timeout_secs),
            )))
        }
        None => {
            info!("🔢 Rate-limit counters: in-process (set REDIS_URL for multi-instance deployments)");
            Ok(Arc::new(MemoryCounterStore::new()))
        }
    }
}
