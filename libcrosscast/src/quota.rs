//! Per-connection API quota tracking
//!
//! A persisted fixed-window budget per connection: capacity is the
//! connection's `api_quota_limit`, the window length comes from the
//! platform's documented reset model, and the used counter survives
//! process restarts. The gate is proactive where the budget is locally
//! known and reactive where the platform reports its own numbers —
//! platform truth always wins over the local estimate.
//!
//! The budget is soft: two concurrent acquires may both pass on the
//! last unit, but the very next call observes the persisted counter and
//! is throttled.

use std::sync::Arc;

use tracing::debug;

use crate::error::{CrosscastError, PlatformError, Result};
use crate::platforms::Connector;
use crate::store::Store;
use crate::types::{QuotaSnapshot, SocialConnection};

pub struct QuotaTracker {
    store: Arc<dyn Store>,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Gate one outbound call for this connection at the current time.
    pub async fn acquire(&self, connection: &SocialConnection) -> Result<()> {
        self.acquire_at(connection, chrono::Utc::now().timestamp())
            .await
    }

    /// Gate one outbound call at `now`.
    ///
    /// An elapsed window resets the counter before the check. On an
    /// exhausted budget this returns `RateLimited` without any outbound
    /// request; otherwise one unit is consumed and persisted.
    pub async fn acquire_at(&self, connection: &SocialConnection, now: i64) -> Result<()> {
        let current = self
            .store
            .get_connection(connection.id)
            .await?
            .ok_or_else(|| {
                CrosscastError::NotFound(format!("connection {} does not exist", connection.id))
            })?;

        let window = current.platform.quota_window_secs();
        let window_open =
            current.quota_window_started_at > 0 && now < current.quota_window_started_at + window;

        let (used, window_start) = if window_open {
            (current.api_quota_used, current.quota_window_started_at)
        } else {
            (0, now)
        };

        if used >= current.api_quota_limit {
            let reset_at = window_start + window;
            return Err(PlatformError::RateLimited(format!(
                "{} budget exhausted for connection {} ({}/{}); resets in {}s",
                current.platform,
                current.id,
                used,
                current.api_quota_limit,
                (reset_at - now).max(0)
            ))
            .into());
        }

        self.store
            .update_quota(current.id, used + 1, window_start)
            .await
    }

    /// Overwrite the local estimate with platform-reported state.
    pub async fn reconcile(&self, connection_id: i64, snapshot: QuotaSnapshot) -> Result<()> {
        let Some(current) = self.store.get_connection(connection_id).await? else {
            return Ok(());
        };

        let used = (snapshot.limit - snapshot.remaining).max(0);
        let window = current.platform.quota_window_secs();
        let window_start = snapshot
            .reset_at
            .map(|reset| reset - window)
            .unwrap_or_else(|| {
                if current.quota_window_started_at > 0 {
                    current.quota_window_started_at
                } else {
                    chrono::Utc::now().timestamp()
                }
            });

        debug!(
            connection_id,
            used, snapshot.limit, "Reconciled quota from platform headers"
        );
        self.store
            .update_quota(connection_id, used, window_start)
            .await
    }

    /// Fold the snapshot a connector captured on its most recent call,
    /// if it captured one.
    pub async fn reconcile_from(
        &self,
        connection_id: i64,
        connector: &dyn Connector,
    ) -> Result<()> {
        if let Some(snapshot) = connector.take_quota_snapshot() {
            self.reconcile(connection_id, snapshot).await?;
        }
        Ok(())
    }
}
