//! Core types for Crosscast
//!
//! Canonical data model shared by the store, the platform connectors, and
//! the orchestration layers. Platform payloads never leak past the
//! normalizer; everything downstream speaks these types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CrosscastError;

/// The closed set of supported platforms.
///
/// Adding a platform means adding a variant here; the connector registry
/// matches exhaustively on this enum, so a missing adapter is a compile
/// error rather than a runtime lookup miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Instagram,
    Linkedin,
    Facebook,
    Youtube,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Twitter,
        Platform::Instagram,
        Platform::Linkedin,
        Platform::Facebook,
        Platform::Youtube,
        Platform::Tiktok,
    ];

    /// Lowercase wire name, used in the database and the HTTP surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Linkedin => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Hard content ceiling for published posts, if the platform has one.
    pub fn character_limit(&self) -> Option<usize> {
        match self {
            Platform::Twitter => Some(280),
            Platform::Instagram => Some(2200),
            Platform::Linkedin => Some(3000),
            Platform::Facebook => None,
            Platform::Youtube => None,
            Platform::Tiktok => Some(2200),
        }
    }

    /// Default request budget for a new connection, matched to the
    /// platform's documented rate-limit model.
    pub fn default_quota_limit(&self) -> i64 {
        match self {
            Platform::Twitter => 900,
            Platform::Instagram => 200,
            Platform::Linkedin => 500,
            Platform::Facebook => 200,
            Platform::Youtube => 10_000,
            Platform::Tiktok => 600,
        }
    }

    /// Fixed quota reset window in seconds. Twitter buckets reset every
    /// 15 minutes, the Graph APIs hourly, the rest daily.
    pub fn quota_window_secs(&self) -> i64 {
        match self {
            Platform::Twitter => 900,
            Platform::Instagram => 3600,
            Platform::Facebook => 3600,
            Platform::Linkedin => 86_400,
            Platform::Youtube => 86_400,
            Platform::Tiktok => 86_400,
        }
    }

    /// Whether the platform exposes a write endpoint for text posts.
    /// YouTube's Data API does not.
    pub fn supports_publishing(&self) -> bool {
        !matches!(self, Platform::Youtube)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CrosscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::Linkedin),
            "facebook" => Ok(Platform::Facebook),
            "youtube" => Ok(Platform::Youtube),
            "tiktok" => Ok(Platform::Tiktok),
            other => Err(CrosscastError::InvalidInput(format!(
                "Unknown platform: '{}'. Valid platforms: twitter, instagram, linkedin, facebook, youtube, tiktok",
                other
            ))),
        }
    }
}

/// Derived lifecycle state of a connection, computed from persisted
/// fields rather than stored. The UI prompts re-authentication only on
/// `Revoked` and shows a transient indicator on `RateLimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Active,
    Expired,
    RateLimited,
    Revoked,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Expired => "expired",
            ConnectionStatus::RateLimited => "ratelimited",
            ConnectionStatus::Revoked => "revoked",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

/// A persisted link between a local user/client and one external
/// platform identity. The credential store exclusively owns the token
/// material on this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialConnection {
    pub id: i64,
    pub user_id: i64,
    /// Agency-managed client this connection belongs to, if any.
    pub client_id: Option<i64>,
    pub platform: Platform,
    pub username: String,
    pub platform_user_id: String,
    pub profile_url: Option<String>,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` means the token does not expire.
    pub token_expires_at: Option<i64>,
    pub api_quota_used: i64,
    pub api_quota_limit: i64,
    /// Anchor of the current fixed quota window (Unix seconds; 0 means
    /// no window opened yet).
    pub quota_window_started_at: i64,
    pub scopes: Option<String>,
    pub webhook_url: Option<String>,
    pub is_active: bool,
    /// User-visible reason when the connection entered `Revoked`.
    pub revoked_reason: Option<String>,
    pub last_sync_at: Option<i64>,
    /// Opaque per-platform extension map.
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

impl SocialConnection {
    /// Whether the stored access token is past its expiry at `now`.
    pub fn token_expired(&self, now: i64) -> bool {
        self.token_expires_at.is_some_and(|t| t <= now)
    }

    /// Whether the token expires within `margin_secs` of `now`. Used to
    /// refresh proactively instead of burning a request on a 401.
    pub fn token_expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.token_expires_at.is_some_and(|t| t <= now + margin_secs)
    }

    /// Whether the current fixed quota window still has the budget
    /// exhausted at `now`. An elapsed window means the budget is back.
    pub fn quota_exhausted(&self, now: i64) -> bool {
        self.api_quota_used >= self.api_quota_limit
            && now < self.quota_window_started_at + self.platform.quota_window_secs()
    }

    /// Derive the lifecycle state from persisted fields.
    pub fn status(&self, now: i64) -> ConnectionStatus {
        if !self.is_active {
            if self.revoked_reason.is_some() {
                return ConnectionStatus::Revoked;
            }
            return ConnectionStatus::Disconnected;
        }
        if self.platform_user_id.is_empty() {
            // Imported without validation; no platform identity yet.
            return ConnectionStatus::Pending;
        }
        if self.token_expired(now) {
            return ConnectionStatus::Expired;
        }
        if self.quota_exhausted(now) {
            return ConnectionStatus::RateLimited;
        }
        ConnectionStatus::Active
    }
}

/// Connection as surfaced over HTTP: everything except token material,
/// plus the derived status so the UI can prompt re-authentication only
/// on `revoked` and show a syncing indicator on transient states.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub id: i64,
    pub user_id: i64,
    pub client_id: Option<i64>,
    pub platform: Platform,
    pub username: String,
    pub platform_user_id: String,
    pub profile_url: Option<String>,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub token_expires_at: Option<i64>,
    pub api_quota_used: i64,
    pub api_quota_limit: i64,
    pub scopes: Option<String>,
    pub webhook_url: Option<String>,
    pub is_active: bool,
    pub revoked_reason: Option<String>,
    pub last_sync_at: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
    pub status: ConnectionStatus,
}

impl ConnectionView {
    pub fn from_connection(connection: &SocialConnection, now: i64) -> Self {
        Self {
            id: connection.id,
            user_id: connection.user_id,
            client_id: connection.client_id,
            platform: connection.platform,
            username: connection.username.clone(),
            platform_user_id: connection.platform_user_id.clone(),
            profile_url: connection.profile_url.clone(),
            avatar_url: connection.avatar_url.clone(),
            follower_count: connection.follower_count,
            following_count: connection.following_count,
            post_count: connection.post_count,
            token_expires_at: connection.token_expires_at,
            api_quota_used: connection.api_quota_used,
            api_quota_limit: connection.api_quota_limit,
            scopes: connection.scopes.clone(),
            webhook_url: connection.webhook_url.clone(),
            is_active: connection.is_active,
            revoked_reason: connection.revoked_reason.clone(),
            last_sync_at: connection.last_sync_at,
            metadata: connection.metadata.clone(),
            created_at: connection.created_at,
            status: connection.status(now),
        }
    }
}

/// Raw credentials submitted at onboarding, before a connection exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Fields for registering a new connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    pub user_id: i64,
    pub client_id: Option<i64>,
    pub platform: Platform,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub platform_user_id: String,
    pub profile_url: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub follower_count: i64,
    #[serde(default)]
    pub following_count: i64,
    #[serde(default)]
    pub post_count: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub api_quota_limit: Option<i64>,
    pub scopes: Option<String>,
    pub webhook_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewConnection {
    pub fn new(user_id: i64, platform: Platform, credentials: Credentials) -> Self {
        Self {
            user_id,
            client_id: None,
            platform,
            username: String::new(),
            platform_user_id: String::new(),
            profile_url: None,
            avatar_url: None,
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            access_token: credentials.access_token,
            refresh_token: credentials.refresh_token,
            token_expires_at: None,
            api_quota_limit: None,
            scopes: None,
            webhook_url: None,
            metadata: None,
        }
    }

    /// Seed identity and counters from a validated profile.
    pub fn with_profile(mut self, profile: &Profile) -> Self {
        self.username = profile.username.clone();
        self.platform_user_id = profile.platform_user_id.clone();
        self.profile_url = profile.profile_url.clone();
        self.avatar_url = profile.avatar_url.clone();
        self.follower_count = profile.follower_count;
        self.following_count = profile.following_count;
        self.post_count = profile.post_count;
        self
    }
}

/// Partial update for PUT on a connection. `None` fields are untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    pub client_id: Option<i64>,
    pub username: Option<String>,
    pub profile_url: Option<String>,
    pub avatar_url: Option<String>,
    pub api_quota_limit: Option<i64>,
    pub scopes: Option<String>,
    pub webhook_url: Option<String>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

/// Canonical identity snapshot fetched from a platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub platform_user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub profile_url: Option<String>,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
}

/// Canonical aggregate statistics. Missing upstream fields are explicit
/// zeros, never omitted keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub followers: i64,
    pub following: i64,
    pub posts: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub impressions: i64,
    pub reach: i64,
    pub engagement_rate: f64,
}

/// One stored metrics row: a `Metrics` aggregate pinned to a connection
/// and a UTC day. One row per (connection, day); re-syncing the same day
/// upserts, the day never mutates after it closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub connection_id: i64,
    /// UTC day, `YYYY-MM-DD`.
    pub date: String,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// A normalized post as produced by a platform connector, before it is
/// bound to a connection row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedPost {
    pub platform_post_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub shares_count: i64,
    pub published_at: Option<i64>,
}

/// A stored post, synced in or published out. `platform_post_id` is
/// unique per connection; re-syncing updates counts, not identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub id: Option<i64>,
    pub connection_id: i64,
    pub platform_post_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub shares_count: i64,
    pub engagement_rate: f64,
    pub published_at: Option<i64>,
    pub fetched_at: i64,
}

impl SocialPost {
    pub fn from_fetched(connection_id: i64, fetched: FetchedPost, fetched_at: i64) -> Self {
        Self {
            id: None,
            connection_id,
            platform_post_id: fetched.platform_post_id,
            content: fetched.content,
            media_urls: fetched.media_urls,
            hashtags: fetched.hashtags,
            mentions: fetched.mentions,
            likes_count: fetched.likes_count,
            comments_count: fetched.comments_count,
            shares_count: fetched.shares_count,
            engagement_rate: 0.0,
            published_at: fetched.published_at,
            fetched_at,
        }
    }
}

/// Result of a token refresh against the platform.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Some platforms rotate the refresh token on every use.
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// Inclusive window for metric queries, Unix seconds.
#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

/// Platform-reported rate-limit state, parsed from response headers.
/// When present, this is authoritative over the local estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: Option<i64>,
}

/// One authored post to broadcast.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Per-target outcome of a broadcast. Partial success is the expected
/// common case, so there is never a single aggregate flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub connection_id: i64,
    pub platform: Platform,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregate of one broadcast across N connections.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub broadcast_id: String,
    pub results: Vec<PublishOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection(platform: Platform) -> SocialConnection {
        SocialConnection {
            id: 1,
            user_id: 10,
            client_id: None,
            platform,
            username: "brand".to_string(),
            platform_user_id: "u-1".to_string(),
            profile_url: None,
            avatar_url: None,
            follower_count: 1000,
            following_count: 50,
            post_count: 200,
            access_token: "tok".to_string(),
            refresh_token: Some("ref".to_string()),
            token_expires_at: None,
            api_quota_used: 0,
            api_quota_limit: platform.default_quota_limit(),
            quota_window_started_at: 0,
            scopes: None,
            webhook_url: None,
            is_active: true,
            revoked_reason: None,
            last_sync_at: None,
            metadata: None,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_platform_parse_aliases_and_case() {
        assert_eq!("x".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::Tiktok);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Linkedin).unwrap();
        assert_eq!(json, r#""linkedin""#);
        let parsed: Platform = serde_json::from_str(r#""tiktok""#).unwrap();
        assert_eq!(parsed, Platform::Tiktok);
    }

    #[test]
    fn test_character_limits() {
        assert_eq!(Platform::Twitter.character_limit(), Some(280));
        assert_eq!(Platform::Facebook.character_limit(), None);
    }

    #[test]
    fn test_youtube_does_not_publish() {
        assert!(!Platform::Youtube.supports_publishing());
        assert!(Platform::Twitter.supports_publishing());
    }

    #[test]
    fn test_token_expiry() {
        let now = 1_700_000_000;
        let mut conn = test_connection(Platform::Twitter);

        // No expiry means non-expiring.
        assert!(!conn.token_expired(now));
        assert!(!conn.token_expires_within(now, 300));

        conn.token_expires_at = Some(now - 1);
        assert!(conn.token_expired(now));

        conn.token_expires_at = Some(now + 100);
        assert!(!conn.token_expired(now));
        assert!(conn.token_expires_within(now, 300));
    }

    #[test]
    fn test_status_active() {
        let now = 1_700_000_000;
        let conn = test_connection(Platform::Twitter);
        assert_eq!(conn.status(now), ConnectionStatus::Active);
    }

    #[test]
    fn test_status_expired() {
        let now = 1_700_000_000;
        let mut conn = test_connection(Platform::Twitter);
        conn.token_expires_at = Some(now - 3600);
        assert_eq!(conn.status(now), ConnectionStatus::Expired);
    }

    #[test]
    fn test_status_rate_limited_until_window_elapses() {
        let now = 1_700_000_000;
        let mut conn = test_connection(Platform::Twitter);
        conn.api_quota_used = conn.api_quota_limit;
        conn.quota_window_started_at = now - 10;
        assert_eq!(conn.status(now), ConnectionStatus::RateLimited);

        // Window elapsed: the budget is back even before the counter resets.
        let later = now + Platform::Twitter.quota_window_secs();
        assert_eq!(conn.status(later), ConnectionStatus::Active);
    }

    #[test]
    fn test_status_revoked_vs_disconnected() {
        let now = 1_700_000_000;
        let mut conn = test_connection(Platform::Twitter);

        conn.is_active = false;
        assert_eq!(conn.status(now), ConnectionStatus::Disconnected);

        conn.revoked_reason = Some("refresh token rejected".to_string());
        assert_eq!(conn.status(now), ConnectionStatus::Revoked);
    }

    #[test]
    fn test_status_pending_without_identity() {
        let now = 1_700_000_000;
        let mut conn = test_connection(Platform::Instagram);
        conn.platform_user_id = String::new();
        assert_eq!(conn.status(now), ConnectionStatus::Pending);
    }

    #[test]
    fn test_new_connection_with_profile() {
        let profile = Profile {
            platform_user_id: "12345".to_string(),
            username: "acme".to_string(),
            display_name: Some("Acme Inc".to_string()),
            profile_url: Some("https://twitter.com/acme".to_string()),
            avatar_url: None,
            follower_count: 42,
            following_count: 7,
            post_count: 9,
        };

        let new = NewConnection::new(
            1,
            Platform::Twitter,
            Credentials {
                access_token: "tok".to_string(),
                refresh_token: None,
            },
        )
        .with_profile(&profile);

        assert_eq!(new.platform_user_id, "12345");
        assert_eq!(new.username, "acme");
        assert_eq!(new.follower_count, 42);
    }

    #[test]
    fn test_metrics_snapshot_flattens() {
        let snapshot = MetricsSnapshot {
            connection_id: 3,
            date: "2024-06-01".to_string(),
            metrics: Metrics {
                followers: 100,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["connectionId"], 3);
        assert_eq!(json["followers"], 100);
        assert_eq!(json["engagementRate"], 0.0);
    }

    #[test]
    fn test_connection_view_carries_status_but_no_tokens() {
        let now = 1_700_000_000;
        let mut conn = test_connection(Platform::Twitter);
        conn.token_expires_at = Some(now - 1);

        let view = ConnectionView::from_connection(&conn, now);
        assert_eq!(view.status, ConnectionStatus::Expired);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("accessToken").is_none());
        assert!(json.get("refreshToken").is_none());
        assert_eq!(json["status"], "expired");
    }

    #[test]
    fn test_social_post_from_fetched() {
        let fetched = FetchedPost {
            platform_post_id: "p-1".to_string(),
            content: "hello #launch".to_string(),
            hashtags: vec!["launch".to_string()],
            likes_count: 3,
            published_at: Some(1_700_000_000),
            ..Default::default()
        };

        let post = SocialPost::from_fetched(9, fetched, 1_700_000_100);
        assert_eq!(post.connection_id, 9);
        assert_eq!(post.platform_post_id, "p-1");
        assert_eq!(post.likes_count, 3);
        assert_eq!(post.fetched_at, 1_700_000_100);
        assert!(post.id.is_none());
    }
}
