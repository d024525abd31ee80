//! Sync orchestration
//!
//! Pulls profile, daily metrics, and incremental posts for every active
//! connection with bounded concurrency: the worker pool is sized
//! independently of the connection count, so a large account set never
//! opens unbounded outbound connections. One connection's failure is
//! logged and skipped for the cycle, never aborting the batch.
//! `last_sync_at` advances only after a successful persist, so a crash
//! mid-sync repeats idempotently on the next run instead of silently
//! skipping data.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::platforms::ConnectorRegistry;
use crate::quota::QuotaTracker;
use crate::store::Store;
use crate::tokens::TokenManager;
use crate::types::{MetricsSnapshot, Platform, SocialConnection, SocialPost};

/// Outcome of one sync cycle.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: Vec<SyncFailure>,
}

#[derive(Debug)]
pub struct SyncFailure {
    pub connection_id: i64,
    pub platform: Platform,
    pub error: String,
}

pub struct SyncOrchestrator {
    store: Arc<dyn Store>,
    registry: Arc<ConnectorRegistry>,
    tokens: Arc<TokenManager>,
    quota: Arc<QuotaTracker>,
    workers: usize,
    post_page_size: usize,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ConnectorRegistry>,
        tokens: Arc<TokenManager>,
        quota: Arc<QuotaTracker>,
        workers: usize,
        post_page_size: usize,
    ) -> Self {
        Self {
            store,
            registry,
            tokens,
            quota,
            workers: workers.max(1),
            post_page_size,
        }
    }

    /// Sync every active connection once.
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        let connections = self.store.list_active_connections().await?;
        info!(
            connections = connections.len(),
            workers = self.workers,
            "Sync cycle starting"
        );

        let outcomes: Vec<(i64, Platform, Result<()>)> = stream::iter(connections)
            .map(|connection| async move {
                let id = connection.id;
                let platform = connection.platform;
                let outcome = self.sync_connection(&connection).await;
                (id, platform, outcome)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = SyncReport::default();
        for (connection_id, platform, outcome) in outcomes {
            match outcome {
                Ok(()) => report.synced += 1,
                Err(err) => {
                    // Isolated per connection; retried on the next cycle.
                    warn!(
                        connection_id,
                        platform = %platform,
                        "Sync skipped this cycle: {}",
                        err
                    );
                    report.failed.push(SyncFailure {
                        connection_id,
                        platform,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            synced = report.synced,
            failed = report.failed.len(),
            "Sync cycle finished"
        );
        Ok(report)
    }

    /// Sync one connection: profile, today's metrics snapshot, and
    /// incremental posts since the last watermark.
    pub async fn sync_connection(&self, connection: &SocialConnection) -> Result<()> {
        let connector = self.registry.get(connection.platform)?;
        let cycle_started_at = chrono::Utc::now().timestamp();

        // Profile refresh, reconciled onto the connection row.
        self.quota.acquire(connection).await?;
        let profile = self
            .tokens
            .call_with_refresh(connection, |fresh| {
                let connector = Arc::clone(&connector);
                async move { connector.fetch_profile(&fresh).await }
            })
            .await?;
        self.store.update_profile(connection.id, &profile).await?;

        // Today's metrics snapshot, upserted by (connection, day).
        self.quota.acquire(connection).await?;
        let metrics = self
            .tokens
            .call_with_refresh(connection, |fresh| {
                let connector = Arc::clone(&connector);
                async move { connector.fetch_metrics(&fresh, None).await }
            })
            .await?;
        self.store
            .upsert_metrics(&MetricsSnapshot {
                connection_id: connection.id,
                date: utc_day(cycle_started_at),
                metrics,
            })
            .await?;

        // Incremental posts: `since` is the last successful watermark.
        self.quota.acquire(connection).await?;
        let since = connection.last_sync_at;
        let page_size = self.post_page_size;
        let posts = self
            .tokens
            .call_with_refresh(connection, |fresh| {
                let connector = Arc::clone(&connector);
                async move { connector.fetch_posts(&fresh, page_size, since).await }
            })
            .await?;

        let fetched = posts.len();
        for post in posts {
            self.store
                .upsert_post(&SocialPost::from_fetched(
                    connection.id,
                    post,
                    cycle_started_at,
                ))
                .await?;
        }

        if let Err(err) = self
            .quota
            .reconcile_from(connection.id, connector.as_ref())
            .await
        {
            warn!(
                connection_id = connection.id,
                "Quota reconcile failed: {}", err
            );
        }

        // Advance the watermark only now that everything is persisted.
        self.store
            .set_last_sync(connection.id, cycle_started_at)
            .await?;

        debug!(
            connection_id = connection.id,
            platform = %connection.platform,
            fetched,
            "Connection synced"
        );
        Ok(())
    }
}

fn utc_day(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_day_formatting() {
        assert_eq!(utc_day(1717243200), "2024-06-01");
        assert_eq!(utc_day(0), "1970-01-01");
    }
}
