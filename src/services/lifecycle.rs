use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::notify::NotificationSink;
use crate::services::storage::ObjectStorage;
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExpirySweepReport {
    pub deleted_shares: u64,
    pub deleted_objects: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct GhostSweepReport {
    /// Share ids whose prefix was fully reclaimed and whose rows were deleted
    pub reclaimed: Vec<String>,
    /// Slugs whose object deletion failed; their rows are retained so the
    /// next run retries them
    pub failed: Vec<String>,
}

/// Periodic reconciliation of database rows against bucket contents. Both
/// sweeps recompute from authoritative state on every run instead of
/// tracking deltas, so a crash between steps is repaired by the next tick.
pub struct LifecycleService {
    db: DatabaseConnection,
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn NotificationSink>,
    sweep_interval: Duration,
}

impl LifecycleService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn NotificationSink>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            db,
            storage,
            notifier,
            sweep_interval,
        }
    }

    /// Background runner: both sweeps on a fixed schedule until shutdown.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_expiry_sweep(Utc::now()).await {
                            Ok(report) => tracing::info!(
                                deleted_shares = report.deleted_shares,
                                deleted_objects = report.deleted_objects,
                                "expiry sweep completed"
                            ),
                            Err(e) => tracing::error!("Expiry sweep failed: {}", e),
                        }
                        match self.run_ghost_sweep().await {
                            Ok(report) => tracing::info!(
                                reclaimed = report.reclaimed.len(),
                                failed = report.failed.len(),
                                "ghost sweep completed"
                            ),
                            Err(e) => tracing::error!("Ghost sweep failed: {}", e),
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Lifecycle runner shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Pass 1 deletes rows past their expiry; pass 2 deletes every object
    /// whose top-level prefix has no matching live share (abandoned presigns,
    /// phase-1/phase-2 races). Idempotent; safe to interleave with traffic.
    pub async fn run_expiry_sweep(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExpirySweepReport, AppError> {
        let expired = Shares::find()
            .filter(shares::Column::ExpiresAt.lt(now))
            .all(&self.db)
            .await?;

        let deleted_shares = if expired.is_empty() {
            0
        } else {
            let ids: Vec<String> = expired.iter().map(|s| s.id.clone()).collect();
            UploadedFiles::delete_many()
                .filter(uploaded_files::Column::ShareId.is_in(ids.clone()))
                .exec(&self.db)
                .await?;
            let result = Shares::delete_many()
                .filter(shares::Column::Id.is_in(ids))
                .exec(&self.db)
                .await?;
            result.rows_affected
        };

        let keys = self.storage.list_objects(None).await.map_err(|e| {
            tracing::error!("Failed to list bucket contents: {}", e);
            AppError::Unavailable("object storage unavailable".to_string())
        })?;

        let live_slugs: HashSet<String> = Shares::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|s| s.slug)
            .collect();

        let mut deleted_objects = 0u64;
        for key in keys {
            let prefix = key.split('/').next().unwrap_or(&key);
            if live_slugs.contains(prefix) {
                continue;
            }
            match self.storage.delete_object(&key).await {
                Ok(()) => deleted_objects += 1,
                Err(e) => {
                    // Best-effort sweep: the next run recomputes from scratch
                    tracing::warn!("Failed to delete orphaned object {}: {}", key, e);
                }
            }
        }

        Ok(ExpirySweepReport {
            deleted_shares,
            deleted_objects,
        })
    }

    /// Reclaims ghost shares: rows owning zero files. Object prefixes are
    /// deleted best-effort; only shares whose prefix was fully cleared are
    /// removed from the database, the rest are retried on the next run.
    pub async fn run_ghost_sweep(&self) -> Result<GhostSweepReport, AppError> {
        let shares = Shares::find().all(&self.db).await?;
        let referenced: HashSet<String> = UploadedFiles::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|f| f.share_id)
            .collect();

        let mut report = GhostSweepReport::default();

        for share in shares {
            if referenced.contains(&share.id) {
                continue;
            }

            match self.reclaim_prefix(&share.slug).await {
                Ok(()) => report.reclaimed.push(share.id),
                Err(e) => {
                    tracing::warn!("Failed to reclaim prefix for ghost {}: {}", share.slug, e);
                    report.failed.push(share.slug);
                }
            }
        }

        if !report.reclaimed.is_empty() {
            Shares::delete_many()
                .filter(shares::Column::Id.is_in(report.reclaimed.clone()))
                .exec(&self.db)
                .await?;
        }

        let summary = format!(
            "Ghost sweep: reclaimed {} share(s), {} failure(s){}",
            report.reclaimed.len(),
            report.failed.len(),
            if report.failed.is_empty() {
                String::new()
            } else {
                format!(" [{}]", report.failed.join(", "))
            }
        );
        self.notifier.send(&summary).await;

        Ok(report)
    }

    async fn reclaim_prefix(&self, slug: &str) -> anyhow::Result<()> {
        let prefix = format!("{}/", slug);
        let keys = self.storage.list_objects(Some(&prefix)).await?;
        for key in keys {
            self.storage.delete_object(&key).await?;
        }
        Ok(())
    }
}
