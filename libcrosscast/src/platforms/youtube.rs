//! YouTube platform adapter
//!
//! Speaks the Data API v3. Post listing is the two-call search-then-hydrate
//! flow because `search` returns no statistics. The Data API exposes no
//! write endpoint for text/community posts, so `publish` is a per-target
//! rejection that the broadcast aggregation reports like any other.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::config::OAuthApp;
use crate::error::{PlatformError, Result};
use crate::normalize;
use crate::platforms::http::{parse_oauth_token_response, PlatformHttp};
use crate::platforms::{filter_since, Connector};
use crate::types::{
    Credentials, DateRange, FetchedPost, Metrics, Platform, Profile, QuotaSnapshot,
    RefreshedToken, SocialConnection,
};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub struct YoutubeConnector {
    http: PlatformHttp,
    app: Option<OAuthApp>,
}

impl YoutubeConnector {
    pub fn new(app: Option<OAuthApp>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: PlatformHttp::new(Platform::Youtube, timeout)?,
            app,
        })
    }

    async fn channel(&self, token: &str) -> Result<Value> {
        let url = format!(
            "{}/channels?part=snippet,statistics&mine=true",
            API_BASE
        );
        self.http.get_json(&url, token, "fetch channel").await
    }

    async fn videos(&self, token: &str, limit: usize) -> Result<Value> {
        let search_url = format!(
            "{}/search?part=id&forMine=true&type=video&order=date&maxResults={}",
            API_BASE,
            limit.min(50)
        );
        let search = self.http.get_json(&search_url, token, "search videos").await?;

        let ids: Vec<&str> = search
            .pointer("/items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.pointer("/id/videoId").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if ids.is_empty() {
            return Ok(serde_json::json!({ "items": [] }));
        }

        let videos_url = format!(
            "{}/videos?part=snippet,statistics&id={}",
            API_BASE,
            ids.join(",")
        );
        self.http.get_json(&videos_url, token, "fetch videos").await
    }
}

#[async_trait]
impl Connector for YoutubeConnector {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Profile> {
        let raw = self.channel(&credentials.access_token).await?;
        Ok(normalize::youtube::profile(&raw))
    }

    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile> {
        let raw = self.channel(&connection.access_token).await?;
        Ok(normalize::youtube::profile(&raw))
    }

    async fn fetch_metrics(
        &self,
        connection: &SocialConnection,
        window: Option<DateRange>,
    ) -> Result<Metrics> {
        let channel = self.channel(&connection.access_token).await?;
        let raw_videos = self.videos(&connection.access_token, 50).await?;
        let mut posts = normalize::youtube::posts(&raw_videos);
        if let Some(range) = window {
            posts.retain(|p| {
                p.published_at
                    .is_none_or(|ts| ts >= range.start && ts <= range.end)
            });
        }
        Ok(normalize::youtube::metrics(&channel, &posts))
    }

    async fn fetch_posts(
        &self,
        connection: &SocialConnection,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<FetchedPost>> {
        let raw = self.videos(&connection.access_token, limit).await?;
        let mut posts = filter_since(normalize::youtube::posts(&raw), since);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn publish(
        &self,
        _connection: &SocialConnection,
        _content: &str,
        _media_urls: &[String],
    ) -> Result<String> {
        Err(PlatformError::PlatformRejected(
            "youtube: the Data API exposes no endpoint for publishing text posts".to_string(),
        )
        .into())
    }

    async fn refresh_token(&self, connection: &SocialConnection) -> Result<RefreshedToken> {
        let app = self.app.as_ref().ok_or_else(|| {
            PlatformError::AuthExpired(
                "youtube: no OAuth application configured for token refresh".to_string(),
            )
        })?;
        let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
            PlatformError::Revoked("youtube: connection has no refresh token".to_string())
        })?;

        let raw = self
            .http
            .refresh_form(
                TOKEN_URL,
                None,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", &app.client_id),
                    ("client_secret", app.client_secret.expose_secret()),
                ],
            )
            .await?;

        // Google never rotates the refresh token on this grant.
        parse_oauth_token_response(Platform::Youtube, &raw)
    }

    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.http.take_quota_snapshot()
    }
}
