//! Facebook platform adapter
//!
//! Speaks the Graph API against a page token. Posts and page insights
//! both support native `since`/`until` windowing, so no client-side
//! computation is needed beyond folding the insight series.

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

const API_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookConnector {
    http: PlatformHttp,
    app: Option<OAuthApp>,
}

impl FacebookConnector {
    pub fn new(app: Option<OAuthApp>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: PlatformHttp::new(Platform::Facebook, timeout)?,
            app,
        })
    }

    async fn me(&self, token: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/me?fields=id,name,username,link,picture{{url}},followers_count,fan_count",
            API_BASE
        );
        self.http.get_json(&url, token, "fetch profile").await
    }
}

#[async_trait]
impl Connector for FacebookConnector {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Profile> {
        let raw = self.me(&credentials.access_token).await?;
        Ok(normalize::facebook::profile(&raw))
    }

    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile> {
        let raw = self.me(&connection.access_token).await?;
        Ok(normalize::facebook::profile(&raw))
    }

    async fn fetch_metrics(
        &self,
        connection: &SocialConnection,
        window: Option<DateRange>,
    ) -> Result<Metrics> {
        let profile = self.fetch_profile(connection).await?;
        let posts = self.fetch_posts(connection, 50, None).await?;

        let mut url = format!(
            "{}/me/insights?metric=page_impressions,page_impressions_unique&period=day",
            API_BASE
        );
        if let Some(range) = window {
            url.push_str(&format!("&since={}&until={}", range.start, range.end));
        }
        let insights = self
            .http
            .get_json(&url, &connection.access_token, "fetch insights")
            .await?;

        Ok(normalize::facebook::metrics(&insights, &profile, &posts))
    }

    async fn fetch_posts(
        &self,
        connection: &SocialConnection,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<FetchedPost>> {
        let mut url = format!(
            "{}/me/posts?fields=id,message,created_time,full_picture,likes.summary(true),comments.summary(true),shares&limit={}",
            API_BASE, limit
        );
        if let Some(bound) = since {
            url.push_str(&format!("&since={}", bound + 1));
        }

        let raw = self
            .http
            .get_json(&url, &connection.access_token, "fetch posts")
            .await?;

        let mut posts = filter_since(normalize::facebook::posts(&raw), since);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn publish(
        &self,
        connection: &SocialConnection,
        content: &str,
        media_urls: &[String],
    ) -> Result<String> {
        let mut body = json!({ "message": content });
        if let Some(link) = media_urls.first() {
            body["link"] = json!(link);
        }

        let raw = self
            .http
            .post_json(
                &format!("{}/me/feed", API_BASE),
                &connection.access_token,
                &body,
                "publish post",
            )
            .await?;

        let post_id = normalize::facebook::published_post_id(&raw);
        if post_id.is_empty() {
            return Err(PlatformError::Transient(
                "facebook publish response carried no post id".to_string(),
            )
            .into());
        }
        Ok(post_id)
    }

    async fn refresh_token(&self, connection: &SocialConnection) -> Result<RefreshedToken> {
        let app = self.app.as_ref().ok_or_else(|| {
            PlatformError::AuthExpired(
                "facebook: no OAuth application configured for token refresh".to_string(),
            )
        })?;

        // Graph API long-lived tokens renew through the exchange
        // endpoint using the current (still valid) token as the grant.
        let url = format!(
            "{}/oauth/access_token?grant_type=fb_exchange_token&client_id={}&client_secret={}&fb_exchange_token={}",
            API_BASE,
            app.client_id,
            app.client_secret.expose_secret(),
            connection.access_token
        );
        let raw = self
            .http
            .get_json(&url, &connection.access_token, "refresh token")
            .await
            .map_err(|err| {
                let message = err.to_string();
                if message.contains("Error validating access token")
                    || message.contains("has expired")
                {
                    crate::error::CrosscastError::Platform(PlatformError::Revoked(format!(
                        "facebook: token exchange rejected: {}",
                        message
                    )))
                } else {
                    err
                }
            })?;

        parse_oauth_token_response(Platform::Facebook, &raw)
    }

    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.http.take_quota_snapshot()
    }
}
