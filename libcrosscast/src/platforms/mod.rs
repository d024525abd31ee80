//! Platform connectors
//!
//! One implementation per platform exposing a uniform capability set
//! behind the `Connector` trait. Adapters authenticate with the token
//! material handed to them on the connection record, speak their
//! platform's REST API through the shared [`http::PlatformHttp`]
//! helper, and hand raw payloads to the normalizer. They never persist
//! anything themselves.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Credentials, DateRange, FetchedPost, Metrics, Platform, Profile, QuotaSnapshot,
    RefreshedToken, SocialConnection,
};

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod registry;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Available outside cfg(test) so integration tests can build registries
// around it.
pub mod mock;

pub use registry::ConnectorRegistry;

/// Uniform capability set every platform adapter provides.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Which platform this adapter speaks for.
    fn platform(&self) -> Platform;

    /// Validate raw credentials with a minimal read call, before any
    /// connection is persisted. Does not mutate state. Returns the
    /// remote profile so onboarding can seed identity fields.
    async fn test_connection(&self, credentials: &Credentials) -> Result<Profile>;

    /// Fetch identity and follower/post counts.
    ///
    /// # Errors
    ///
    /// `AuthExpired` if the token is rejected, `RateLimited` if the
    /// platform reports budget exhaustion, `Transient` on network/5xx.
    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile>;

    /// Fetch aggregate statistics, optionally bounded to a window.
    /// Platforms without native windowing compute the window client-side
    /// from post-level data.
    async fn fetch_metrics(
        &self,
        connection: &SocialConnection,
        window: Option<DateRange>,
    ) -> Result<Metrics>;

    /// Fetch the most recent posts, newest first, capped at `limit`.
    /// `since` is an exclusive lower bound on publish time, used for
    /// incremental sync.
    async fn fetch_posts(
        &self,
        connection: &SocialConnection,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<FetchedPost>>;

    /// Create a new post from already-transformed content and return the
    /// platform post id. Content limits are enforced upstream by the
    /// pre-publish transform, not rejected here.
    async fn publish(
        &self,
        connection: &SocialConnection,
        content: &str,
        media_urls: &[String],
    ) -> Result<String>;

    /// Exchange the refresh token for new token material.
    ///
    /// Only the token lifecycle manager calls this; routes never do.
    /// A permanent grant failure surfaces as `Revoked`.
    async fn refresh_token(&self, connection: &SocialConnection) -> Result<RefreshedToken>;

    /// Rate-limit state the platform reported on the most recent call,
    /// if any. Consumed (not peeked) so each snapshot reconciles once.
    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        None
    }
}

/// Posts filtered to an exclusive `since` bound, preserving order.
/// Adapters whose APIs lack a native `start_time` parameter filter
/// client-side with this.
pub(crate) fn filter_since(posts: Vec<FetchedPost>, since: Option<i64>) -> Vec<FetchedPost> {
    match since {
        None => posts,
        Some(bound) => posts
            .into_iter()
            .filter(|p| p.published_at.is_none_or(|ts| ts > bound))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_at(ts: i64) -> FetchedPost {
        FetchedPost {
            platform_post_id: format!("p-{}", ts),
            published_at: Some(ts),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_since_exclusive_bound() {
        let posts = vec![post_at(100), post_at(200), post_at(300)];
        let filtered = filter_since(posts, Some(200));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].platform_post_id, "p-300");
    }

    #[test]
    fn test_filter_since_none_passes_all() {
        let posts = vec![post_at(100), post_at(200)];
        assert_eq!(filter_since(posts, None).len(), 2);
    }

    #[test]
    fn test_filter_since_keeps_undated_posts() {
        let mut undated = post_at(0);
        undated.published_at = None;
        let filtered = filter_since(vec![undated], Some(500));
        assert_eq!(filtered.len(), 1);
    }
}
