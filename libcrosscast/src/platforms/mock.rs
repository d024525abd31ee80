//! Mock platform connector for tests
//!
//! A configurable connector that scripts per-operation outcomes and
//! counts every call, so tests can verify orchestration behavior
//! (exactly-once refresh, quota gating, partial-failure aggregation)
//! without credentials or network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{filter_since, Connector};
use crate::types::{
    Credentials, DateRange, FetchedPost, Metrics, Platform, Profile, QuotaSnapshot,
    RefreshedToken, SocialConnection,
};

/// Scripted behavior for a mock connector.
pub struct MockConfig {
    pub platform: Platform,

    /// Profile returned by profile/test calls.
    pub profile: Profile,
    /// Posts returned by `fetch_posts` (before `since` filtering).
    pub posts: Vec<FetchedPost>,
    /// Metrics returned by `fetch_metrics`.
    pub metrics: Metrics,

    /// When set, every read/publish call fails with this error.
    pub call_error: Option<PlatformError>,
    /// When set, `publish` specifically fails with this error.
    pub publish_error: Option<PlatformError>,
    /// When set, `refresh_token` fails with this error.
    pub refresh_error: Option<PlatformError>,

    /// Token material handed out by a successful refresh.
    pub refreshed_token: String,
    /// Refresh expiry offset from now, seconds.
    pub refreshed_expires_in: i64,
    /// When set, read/publish calls fail with `AuthExpired` unless the
    /// connection carries exactly this access token. Used to verify
    /// that refreshed tokens actually reach subsequent calls.
    pub expected_token: Option<String>,

    /// Simulated latency per operation.
    pub delay: Duration,

    /// Quota snapshot handed out (once) after the next call.
    pub quota_snapshot: Mutex<Option<QuotaSnapshot>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            profile: Profile {
                platform_user_id: format!("{}-user", platform.as_str()),
                username: format!("{}-brand", platform.as_str()),
                display_name: None,
                profile_url: None,
                avatar_url: None,
                follower_count: 1000,
                following_count: 100,
                post_count: 10,
            },
            posts: Vec::new(),
            metrics: Metrics {
                followers: 1000,
                ..Default::default()
            },
            call_error: None,
            publish_error: None,
            refresh_error: None,
            refreshed_token: "refreshed-token".to_string(),
            refreshed_expires_in: 3600,
            expected_token: None,
            delay: Duration::from_millis(0),
            quota_snapshot: Mutex::new(None),
        }
    }
}

/// Mock connector with call counters.
pub struct MockConnector {
    config: MockConfig,
    profile_calls: AtomicUsize,
    metrics_calls: AtomicUsize,
    posts_calls: AtomicUsize,
    publish_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    published_content: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(config: MockConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            profile_calls: AtomicUsize::new(0),
            metrics_calls: AtomicUsize::new(0),
            posts_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            published_content: Mutex::new(Vec::new()),
        })
    }

    /// A connector where every operation succeeds.
    pub fn succeeding(platform: Platform) -> Arc<Self> {
        Self::new(MockConfig::new(platform))
    }

    /// A connector whose `publish` always fails with the given error.
    pub fn failing_publish(platform: Platform, error: PlatformError) -> Arc<Self> {
        let mut config = MockConfig::new(platform);
        config.publish_error = Some(error);
        Self::new(config)
    }

    /// A connector whose every call fails with the given error.
    pub fn failing(platform: Platform, error: PlatformError) -> Arc<Self> {
        let mut config = MockConfig::new(platform);
        config.call_error = Some(error.clone());
        config.publish_error = Some(error);
        Self::new(config)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn posts_calls(&self) -> usize {
        self.posts_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Total outbound calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.profile_calls()
            + self.metrics_calls()
            + self.posts_calls()
            + self.publish_calls()
            + self.refresh_calls()
    }

    pub fn published_content(&self) -> Vec<String> {
        self.published_content.lock().unwrap().clone()
    }

    async fn simulate(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn check_call(&self, connection: Option<&SocialConnection>) -> Result<()> {
        if let Some(error) = &self.config.call_error {
            return Err(error.clone().into());
        }
        if let (Some(expected), Some(conn)) = (&self.config.expected_token, connection) {
            if &conn.access_token != expected {
                return Err(PlatformError::AuthExpired(format!(
                    "{}: mock rejected access token",
                    self.config.platform
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn test_connection(&self, _credentials: &Credentials) -> Result<Profile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await;
        self.check_call(None)?;
        Ok(self.config.profile.clone())
    }

    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await;
        self.check_call(Some(connection))?;
        Ok(self.config.profile.clone())
    }

    async fn fetch_metrics(
        &self,
        connection: &SocialConnection,
        _window: Option<DateRange>,
    ) -> Result<Metrics> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await;
        self.check_call(Some(connection))?;
        Ok(self.config.metrics.clone())
    }

    async fn fetch_posts(
        &self,
        connection: &SocialConnection,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<FetchedPost>> {
        self.posts_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await;
        self.check_call(Some(connection))?;
        let mut posts = filter_since(self.config.posts.clone(), since);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn publish(
        &self,
        connection: &SocialConnection,
        content: &str,
        _media_urls: &[String],
    ) -> Result<String> {
        let call = self.publish_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate().await;
        self.check_call(Some(connection))?;
        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }

        self.published_content
            .lock()
            .unwrap()
            .push(content.to_string());
        Ok(format!("{}-mock-{}", self.config.platform, call))
    }

    async fn refresh_token(&self, _connection: &SocialConnection) -> Result<RefreshedToken> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await;
        if let Some(error) = &self.config.refresh_error {
            return Err(error.clone().into());
        }
        Ok(RefreshedToken {
            access_token: self.config.refreshed_token.clone(),
            refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() + self.config.refreshed_expires_in),
        })
    }

    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.config.quota_snapshot.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(platform: Platform, token: &str) -> SocialConnection {
        SocialConnection {
            id: 1,
            user_id: 1,
            client_id: None,
            platform,
            username: "brand".to_string(),
            platform_user_id: "u-1".to_string(),
            profile_url: None,
            avatar_url: None,
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            access_token: token.to_string(),
            refresh_token: Some("ref".to_string()),
            token_expires_at: None,
            api_quota_used: 0,
            api_quota_limit: 100,
            quota_window_started_at: 0,
            scopes: None,
            webhook_url: None,
            is_active: true,
            revoked_reason: None,
            last_sync_at: None,
            metadata: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let mock = MockConnector::succeeding(Platform::Twitter);
        let conn = connection(Platform::Twitter, "tok");

        mock.fetch_profile(&conn).await.unwrap();
        mock.fetch_metrics(&conn, None).await.unwrap();
        mock.publish(&conn, "hello", &[]).await.unwrap();

        assert_eq!(mock.profile_calls(), 1);
        assert_eq!(mock.metrics_calls(), 1);
        assert_eq!(mock.publish_calls(), 1);
        assert_eq!(mock.total_calls(), 3);
        assert_eq!(mock.published_content(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_mock_publish_failure() {
        let mock = MockConnector::failing_publish(
            Platform::Linkedin,
            PlatformError::PlatformRejected("duplicate".to_string()),
        );
        let conn = connection(Platform::Linkedin, "tok");

        let result = mock.publish(&conn, "hello", &[]).await;
        assert!(result.is_err());
        assert_eq!(mock.publish_calls(), 1);
        assert!(mock.published_content().is_empty());
    }

    #[tokio::test]
    async fn test_mock_token_gate() {
        let mut config = MockConfig::new(Platform::Twitter);
        config.expected_token = Some("fresh".to_string());
        let mock = MockConnector::new(config);

        let stale = connection(Platform::Twitter, "stale");
        assert!(mock.fetch_metrics(&stale, None).await.is_err());

        let fresh = connection(Platform::Twitter, "fresh");
        assert!(mock.fetch_metrics(&fresh, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_refresh() {
        let mock = MockConnector::succeeding(Platform::Twitter);
        let conn = connection(Platform::Twitter, "old");

        let token = mock.refresh_token(&conn).await.unwrap();
        assert_eq!(token.access_token, "refreshed-token");
        assert!(token.expires_at.unwrap() > chrono::Utc::now().timestamp());
        assert_eq!(mock.refresh_calls(), 1);
    }
}
