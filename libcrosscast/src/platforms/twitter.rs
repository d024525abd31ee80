//! Twitter/X platform adapter
//!
//! Speaks the v2 API. Tweets carry native `public_metrics` and entity
//! annotations; aggregate metrics are computed client-side from
//! post-level data because v2 exposes no windowed account statistics.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use crate::config::OAuthApp;
use crate::error::{PlatformError, Result};
use crate::normalize;
use crate::platforms::http::{parse_oauth_token_response, PlatformHttp};
use crate::platforms::{filter_since, Connector};
use crate::types::{
    Credentials, DateRange, FetchedPost, Metrics, Platform, Profile, QuotaSnapshot,
    RefreshedToken, SocialConnection,
};

const API_BASE: &str = "https://api.twitter.com/2";
const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";

pub struct TwitterConnector {
    http: PlatformHttp,
    app: Option<OAuthApp>,
}

impl TwitterConnector {
    pub fn new(app: Option<OAuthApp>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: PlatformHttp::new(Platform::Twitter, timeout)?,
            app,
        })
    }

    async fn me(&self, token: &str) -> Result<Value> {
        let url = format!(
            "{}/users/me?user.fields=public_metrics,profile_image_url,url",
            API_BASE
        );
        self.http.get_json(&url, token, "fetch profile").await
    }

    async fn user_id(&self, connection: &SocialConnection) -> Result<String> {
        if !connection.platform_user_id.is_empty() {
            return Ok(connection.platform_user_id.clone());
        }
        let raw = self.me(&connection.access_token).await?;
        Ok(normalize::twitter::profile(&raw).platform_user_id)
    }
}

#[async_trait]
impl Connector for TwitterConnector {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Profile> {
        let raw = self.me(&credentials.access_token).await?;
        Ok(normalize::twitter::profile(&raw))
    }

    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile> {
        let raw = self.me(&connection.access_token).await?;
        Ok(normalize::twitter::profile(&raw))
    }

    async fn fetch_metrics(
        &self,
        connection: &SocialConnection,
        window: Option<DateRange>,
    ) -> Result<Metrics> {
        let profile = self.fetch_profile(connection).await?;
        let mut posts = self.fetch_posts(connection, 100, None).await?;
        if let Some(range) = window {
            posts.retain(|p| {
                p.published_at
                    .is_none_or(|ts| ts >= range.start && ts <= range.end)
            });
        }
        Ok(normalize::metrics_from_posts(&profile, &posts))
    }

    async fn fetch_posts(
        &self,
        connection: &SocialConnection,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<FetchedPost>> {
        let user_id = self.user_id(connection).await?;

        // v2 accepts 5..=100 for max_results.
        let max_results = limit.clamp(5, 100);
        let mut url = format!(
            "{}/users/{}/tweets?max_results={}&tweet.fields=public_metrics,created_at,entities",
            API_BASE, user_id, max_results
        );
        if let Some(bound) = since {
            // start_time is inclusive; the bound is exclusive.
            if let Some(start) = chrono::DateTime::from_timestamp(bound + 1, 0) {
                url.push_str(&format!(
                    "&start_time={}",
                    start.format("%Y-%m-%dT%H:%M:%SZ")
                ));
            }
        }

        let raw = self
            .http
            .get_json(&url, &connection.access_token, "fetch posts")
            .await?;
        let mut posts = filter_since(normalize::twitter::posts(&raw), since);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn publish(
        &self,
        connection: &SocialConnection,
        content: &str,
        _media_urls: &[String],
    ) -> Result<String> {
        let body = json!({ "text": content });
        let raw = self
            .http
            .post_json(
                &format!("{}/tweets", API_BASE),
                &connection.access_token,
                &body,
                "publish post",
            )
            .await?;

        let post_id = normalize::twitter::published_post_id(&raw);
        if post_id.is_empty() {
            return Err(PlatformError::Transient(
                "twitter publish response carried no tweet id".to_string(),
            )
            .into());
        }
        Ok(post_id)
    }

    async fn refresh_token(&self, connection: &SocialConnection) -> Result<RefreshedToken> {
        let app = self.app.as_ref().ok_or_else(|| {
            PlatformError::AuthExpired(
                "twitter: no OAuth application configured for token refresh".to_string(),
            )
        })?;
        let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
            PlatformError::Revoked("twitter: connection has no refresh token".to_string())
        })?;

        let raw = self
            .http
            .refresh_form(
                TOKEN_URL,
                Some((&app.client_id, app.client_secret.expose_secret())),
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", &app.client_id),
                ],
            )
            .await?;

        parse_oauth_token_response(Platform::Twitter, &raw)
    }

    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.http.take_quota_snapshot()
    }
}
