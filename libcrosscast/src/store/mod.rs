//! Credential and content store
//!
//! The store exclusively owns token material; no other component
//! persists tokens. `SqliteStore` is the production backend,
//! `MemoryStore` backs tests. Both implement the same `Store` trait so
//! nothing upstream knows which one it is talking to.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ConnectionUpdate, MetricsSnapshot, NewConnection, Profile, SocialConnection, SocialPost,
};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence interface for connections, metrics snapshots, and posts.
///
/// Metrics and post writes are upsert-only and safe under concurrent
/// writers; token mutation is serialized by the token manager, not here.
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Insert a new connection. Fails if an active connection with the
    /// same (user, platform, platform identity) already exists.
    async fn insert_connection(&self, new: NewConnection) -> Result<SocialConnection>;

    async fn get_connection(&self, id: i64) -> Result<Option<SocialConnection>>;

    /// All connections (active or not) for one user, newest first.
    async fn list_connections(&self, user_id: i64) -> Result<Vec<SocialConnection>>;

    /// Every active connection across all users; the sync orchestrator's
    /// work list.
    async fn list_active_connections(&self) -> Result<Vec<SocialConnection>>;

    /// Apply a partial update. Returns the updated row, or `None` if the
    /// connection does not exist.
    async fn update_connection(
        &self,
        id: i64,
        update: ConnectionUpdate,
    ) -> Result<Option<SocialConnection>>;

    /// Soft delete: deactivate and purge token material. Returns false
    /// if the connection does not exist.
    async fn deactivate_connection(&self, id: i64) -> Result<bool>;

    /// Hard delete the row and its metrics/posts.
    async fn delete_connection(&self, id: i64) -> Result<bool>;

    /// Persist refreshed token material. Only the token manager calls
    /// this.
    async fn update_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()>;

    /// Mark a connection revoked: deactivated, with a user-visible
    /// reason, token material purged.
    async fn mark_revoked(&self, id: i64, reason: &str) -> Result<()>;

    /// Reconcile profile fields (identity, counters) onto the row.
    async fn update_profile(&self, id: i64, profile: &Profile) -> Result<()>;

    /// Persist quota accounting so the budget survives restarts.
    async fn update_quota(&self, id: i64, used: i64, window_started_at: i64) -> Result<()>;

    /// Advance the incremental-sync watermark. Called only after a
    /// successful persist.
    async fn set_last_sync(&self, id: i64, synced_at: i64) -> Result<()>;

    // ------------------------------------------------------------------
    // Metrics snapshots
    // ------------------------------------------------------------------

    /// Upsert the snapshot for its (connection, day) key.
    async fn upsert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()>;

    /// Snapshots for a connection within an inclusive `YYYY-MM-DD` date
    /// range, ascending by date.
    async fn metrics_in_range(
        &self,
        connection_id: i64,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<MetricsSnapshot>>;

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// Insert a post or, when (connection, platform post id) already
    /// exists, update its engagement counts only.
    async fn upsert_post(&self, post: &SocialPost) -> Result<()>;

    /// Most recent posts for a connection, newest first.
    async fn posts_for_connection(
        &self,
        connection_id: i64,
        limit: usize,
    ) -> Result<Vec<SocialPost>>;

    async fn count_posts(&self, connection_id: i64) -> Result<i64>;
}
