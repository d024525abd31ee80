//! TikTok platform adapter
//!
//! Speaks the open.tiktokapis.com v2 surface. Listing endpoints are
//! POSTs with a `fields` query parameter; publishing goes through the
//! content-init flow and returns a publish id that stands in as the
//! platform post id until the post is picked up by sync.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use crate::config::OAuthApp;
use crate::error::{PlatformError, Result};
use crate::normalize;
use crate::platforms::http::{parse_oauth_token_response, PlatformHttp};
use crate::platforms::{filter_since, Connector};
use crate::types::{
    Credentials, DateRange, FetchedPost, Metrics, Platform, Profile, QuotaSnapshot,
    RefreshedToken, SocialConnection,
};

const API_BASE: &str = "https://open.tiktokapis.com/v2";

pub struct TiktokConnector {
    http: PlatformHttp,
    app: Option<OAuthApp>,
}

impl TiktokConnector {
    pub fn new(app: Option<OAuthApp>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: PlatformHttp::new(Platform::Tiktok, timeout)?,
            app,
        })
    }

    async fn user_info(&self, token: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/user/info/?fields=open_id,union_id,display_name,avatar_url,follower_count,following_count,likes_count,video_count,profile_deep_link",
            API_BASE
        );
        self.http.get_json(&url, token, "fetch profile").await
    }
}

#[async_trait]
impl Connector for TiktokConnector {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Profile> {
        let raw = self.user_info(&credentials.access_token).await?;
        Ok(normalize::tiktok::profile(&raw))
    }

    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile> {
        let raw = self.user_info(&connection.access_token).await?;
        Ok(normalize::tiktok::profile(&raw))
    }

    async fn fetch_metrics(
        &self,
        connection: &SocialConnection,
        window: Option<DateRange>,
    ) -> Result<Metrics> {
        let profile = self.fetch_profile(connection).await?;
        let mut posts = self.fetch_posts(connection, 50, None).await?;
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
        let url = format!(
            "{}/video/list/?fields=id,video_description,create_time,like_count,comment_count,share_count,view_count,cover_image_url",
            API_BASE
        );
        let body = json!({ "max_count": limit.clamp(1, 20) });
        let raw = self
            .http
            .post_json(&url, &connection.access_token, &body, "fetch posts")
            .await?;

        let mut posts = filter_since(normalize::tiktok::posts(&raw), since);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn publish(
        &self,
        connection: &SocialConnection,
        content: &str,
        media_urls: &[String],
    ) -> Result<String> {
        let body = json!({
            "post_info": {
                "title": content,
                "privacy_level": "PUBLIC_TO_EVERYONE"
            },
            "source_info": {
                "source": "PULL_FROM_URL",
                "photo_images": media_urls
            }
        });

        let raw = self
            .http
            .post_json(
                &format!("{}/post/publish/content/init/", API_BASE),
                &connection.access_token,
                &body,
                "publish post",
            )
            .await?;

        let publish_id = normalize::tiktok::published_post_id(&raw);
        if publish_id.is_empty() {
            return Err(PlatformError::Transient(
                "tiktok publish response carried no publish id".to_string(),
            )
            .into());
        }
        Ok(publish_id)
    }

    async fn refresh_token(&self, connection: &SocialConnection) -> Result<RefreshedToken> {
        let app = self.app.as_ref().ok_or_else(|| {
            PlatformError::AuthExpired(
                "tiktok: no OAuth application configured for token refresh".to_string(),
            )
        })?;
        let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
            PlatformError::Revoked("tiktok: connection has no refresh token".to_string())
        })?;

        let raw = self
            .http
            .refresh_form(
                &format!("{}/oauth/token/", API_BASE),
                None,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_key", &app.client_id),
                    ("client_secret", app.client_secret.expose_secret()),
                ],
            )
            .await?;

        parse_oauth_token_response(Platform::Tiktok, &raw)
    }

    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.http.take_quota_snapshot()
    }
}
