//! Instagram platform adapter
//!
//! Speaks the Instagram Graph API. Publishing is the two-step container
//! flow (create media container, then publish it) and requires at least
//! one media attachment; Instagram has no text-only posts.

use std::time::Duration;

use async_trait::async_trait;
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

const API_BASE: &str = "https://graph.instagram.com";

pub struct InstagramConnector {
    http: PlatformHttp,
    // Long-lived token refresh needs no app credentials; kept for parity
    // with the registry constructor signature.
    #[allow(dead_code)]
    app: Option<OAuthApp>,
}

impl InstagramConnector {
    pub fn new(app: Option<OAuthApp>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: PlatformHttp::new(Platform::Instagram, timeout)?,
            app,
        })
    }

    async fn me(&self, token: &str) -> Result<Value> {
        let url = format!(
            "{}/me?fields=id,username,name,media_count,followers_count,follows_count,profile_picture_url",
            API_BASE
        );
        self.http.get_json(&url, token, "fetch profile").await
    }
}

#[async_trait]
impl Connector for InstagramConnector {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Profile> {
        let raw = self.me(&credentials.access_token).await?;
        Ok(normalize::instagram::profile(&raw))
    }

    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile> {
        let raw = self.me(&connection.access_token).await?;
        Ok(normalize::instagram::profile(&raw))
    }

    async fn fetch_metrics(
        &self,
        connection: &SocialConnection,
        window: Option<DateRange>,
    ) -> Result<Metrics> {
        let profile = self.fetch_profile(connection).await?;
        let posts = self.fetch_posts(connection, 50, None).await?;

        let mut url = format!("{}/me/insights?metric=impressions,reach&period=day", API_BASE);
        if let Some(range) = window {
            url.push_str(&format!("&since={}&until={}", range.start, range.end));
        }
        let insights = self
            .http
            .get_json(&url, &connection.access_token, "fetch insights")
            .await?;

        Ok(normalize::instagram::metrics(&insights, &profile, &posts))
    }

    async fn fetch_posts(
        &self,
        connection: &SocialConnection,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<FetchedPost>> {
        let url = format!(
            "{}/me/media?fields=id,caption,media_url,permalink,timestamp,like_count,comments_count&limit={}",
            API_BASE, limit
        );
        let raw = self
            .http
            .get_json(&url, &connection.access_token, "fetch posts")
            .await?;

        let mut posts = filter_since(normalize::instagram::posts(&raw), since);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn publish(
        &self,
        connection: &SocialConnection,
        content: &str,
        media_urls: &[String],
    ) -> Result<String> {
        let Some(image_url) = media_urls.first() else {
            return Err(PlatformError::PlatformRejected(
                "instagram requires at least one media attachment; text-only posts are not supported"
                    .to_string(),
            )
            .into());
        };

        // Step 1: create the media container.
        let container = self
            .http
            .post_json(
                &format!("{}/me/media", API_BASE),
                &connection.access_token,
                &json!({ "image_url": image_url, "caption": content }),
                "create media container",
            )
            .await?;
        let container_id = container
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PlatformError::Transient(
                    "instagram container response carried no id".to_string(),
                )
            })?
            .to_string();

        // Step 2: publish the container.
        let published = self
            .http
            .post_json(
                &format!("{}/me/media_publish", API_BASE),
                &connection.access_token,
                &json!({ "creation_id": container_id }),
                "publish media container",
            )
            .await?;

        published
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Transient(
                    "instagram publish response carried no media id".to_string(),
                )
                .into()
            })
    }

    async fn refresh_token(&self, connection: &SocialConnection) -> Result<RefreshedToken> {
        // Long-lived tokens refresh themselves while still valid; an
        // already-expired token cannot be refreshed at all.
        let url = format!(
            "{}/refresh_access_token?grant_type=ig_refresh_token",
            API_BASE
        );
        let raw = self
            .http
            .get_json(&url, &connection.access_token, "refresh token")
            .await
            .map_err(|err| {
                let message = err.to_string();
                if message.contains("Session has expired")
                    || message.contains("cannot be refreshed")
                {
                    crate::error::CrosscastError::Platform(PlatformError::Revoked(format!(
                        "instagram: long-lived token can no longer be refreshed: {}",
                        message
                    )))
                } else {
                    err
                }
            })?;

        parse_oauth_token_response(Platform::Instagram, &raw)
    }

    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.http.take_quota_snapshot()
    }
}
