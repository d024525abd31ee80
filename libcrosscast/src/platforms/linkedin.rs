//! LinkedIn platform adapter
//!
//! Profile identity comes from the OIDC `userinfo` endpoint; the
//! follower count is a best-effort second call that degrades to zero
//! rather than failing the whole profile fetch. Aggregate metrics are
//! computed client-side from post-level data.

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

const API_BASE: &str = "https://api.linkedin.com/v2";
const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";

pub struct LinkedinConnector {
    http: PlatformHttp,
    app: Option<OAuthApp>,
}

impl LinkedinConnector {
    pub fn new(app: Option<OAuthApp>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: PlatformHttp::new(Platform::Linkedin, timeout)?,
            app,
        })
    }

    async fn profile_for_token(&self, token: &str) -> Result<Profile> {
        let userinfo = self
            .http
            .get_json(&format!("{}/userinfo", API_BASE), token, "fetch profile")
            .await?;

        let member_id = userinfo
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let network = if member_id.is_empty() {
            None
        } else {
            let url = format!(
                "{}/networkSizes/urn:li:person:{}?edgeType=CompanyFollowedByMember",
                API_BASE, member_id
            );
            match self.http.get_json(&url, token, "fetch network size").await {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::debug!("linkedin network size unavailable: {}", err);
                    None
                }
            }
        };

        Ok(normalize::linkedin::profile(&userinfo, network.as_ref()))
    }
}

#[async_trait]
impl Connector for LinkedinConnector {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Profile> {
        self.profile_for_token(&credentials.access_token).await
    }

    async fn fetch_profile(&self, connection: &SocialConnection) -> Result<Profile> {
        self.profile_for_token(&connection.access_token).await
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
        let author = format!("urn:li:person:{}", connection.platform_user_id);
        let url = format!(
            "{}/ugcPosts?q=authors&authors=List({})&sortBy=CREATED&count={}",
            API_BASE, author, limit
        );
        let raw = self
            .http
            .get_json(&url, &connection.access_token, "fetch posts")
            .await?;

        let mut posts = filter_since(normalize::linkedin::posts(&raw), since);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn publish(
        &self,
        connection: &SocialConnection,
        content: &str,
        _media_urls: &[String],
    ) -> Result<String> {
        let author = format!("urn:li:person:{}", connection.platform_user_id);
        let body = json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": content },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        let raw = self
            .http
            .post_json(
                &format!("{}/ugcPosts", API_BASE),
                &connection.access_token,
                &body,
                "publish post",
            )
            .await?;

        let post_id = normalize::linkedin::published_post_id(&raw);
        if post_id.is_empty() {
            return Err(PlatformError::Transient(
                "linkedin publish response carried no post id".to_string(),
            )
            .into());
        }
        Ok(post_id)
    }

    async fn refresh_token(&self, connection: &SocialConnection) -> Result<RefreshedToken> {
        let app = self.app.as_ref().ok_or_else(|| {
            PlatformError::AuthExpired(
                "linkedin: no OAuth application configured for token refresh".to_string(),
            )
        })?;
        let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
            PlatformError::Revoked("linkedin: connection has no refresh token".to_string())
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

        parse_oauth_token_response(Platform::Linkedin, &raw)
    }

    fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.http.take_quota_snapshot()
    }
}
