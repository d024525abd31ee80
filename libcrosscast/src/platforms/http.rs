//! Shared HTTP plumbing for platform adapters
//!
//! Wraps a `reqwest::Client` with a bounded per-request timeout and maps
//! HTTP outcomes into the unified `PlatformError` taxonomy so adapters
//! stay thin. Also parses platform rate-limit response headers into
//! [`QuotaSnapshot`]s for reactive quota reconciliation.

use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::types::{Platform, QuotaSnapshot};

/// HTTP client shared by one adapter's calls against its platform.
pub struct PlatformHttp {
    client: reqwest::Client,
    platform: Platform,
    last_quota: Mutex<Option<QuotaSnapshot>>,
}

impl PlatformHttp {
    pub fn new(platform: Platform, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crosscast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                PlatformError::Transient(format!(
                    "{}: failed to build HTTP client: {}",
                    platform, e
                ))
            })?;

        Ok(Self {
            client,
            platform,
            last_quota: Mutex::new(None),
        })
    }

    /// GET a JSON resource with bearer authentication.
    pub async fn get_json(&self, url: &str, token: &str, context: &str) -> Result<Value> {
        let request = self.client.get(url).bearer_auth(token);
        self.execute(request, context).await
    }

    /// POST a JSON body with bearer authentication.
    pub async fn post_json(
        &self,
        url: &str,
        token: &str,
        body: &Value,
        context: &str,
    ) -> Result<Value> {
        let request = self.client.post(url).bearer_auth(token).json(body);
        self.execute(request, context).await
    }

    /// POST a form body, optionally with HTTP Basic client
    /// authentication (OAuth token endpoints).
    pub async fn post_form(
        &self,
        url: &str,
        basic: Option<(&str, &str)>,
        form: &[(&str, &str)],
        context: &str,
    ) -> Result<Value> {
        let mut request = self.client.post(url).form(form);
        if let Some((client_id, client_secret)) = basic {
            let raw = format!("{}:{}", client_id, client_secret);
            let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
            request = request.header("Authorization", format!("Basic {}", encoded));
        }
        self.execute(request, context).await
    }

    /// POST to an OAuth token endpoint. Grant failures that cannot heal
    /// (`invalid_grant` and friends) come back as `Revoked` instead of
    /// the generic 4xx mapping, so the token manager can fail fast.
    pub async fn refresh_form(
        &self,
        url: &str,
        basic: Option<(&str, &str)>,
        form: &[(&str, &str)],
    ) -> Result<Value> {
        match self.post_form(url, basic, form, "refresh token").await {
            Ok(value) => Ok(value),
            Err(err) => {
                let message = err.to_string();
                if message.contains("invalid_grant") || message.contains("invalid_token") {
                    Err(PlatformError::Revoked(format!(
                        "{}: refresh grant rejected: {}",
                        self.platform, message
                    ))
                    .into())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Rate-limit state reported on the most recent response, consumed
    /// once.
    pub fn take_quota_snapshot(&self) -> Option<QuotaSnapshot> {
        self.last_quota.lock().unwrap().take()
    }

    async fn execute(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Value> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PlatformError::Transient(format!(
                    "{} {} timed out after the platform-call deadline",
                    self.platform, context
                ))
            } else {
                PlatformError::Transient(format!("{} {} failed: {}", self.platform, context, e))
            }
        })?;

        if let Some(snapshot) = parse_rate_limit_headers(response.headers()) {
            *self.last_quota.lock().unwrap() = Some(snapshot);
        }

        let status = response.status();
        if status.is_success() {
            return response.json::<Value>().await.map_err(|e| {
                PlatformError::Transient(format!(
                    "{} {} returned unparseable JSON: {}",
                    self.platform, context, e
                ))
                .into()
            });
        }

        Err(self.map_status(status, response, context).await.into())
    }

    /// Map a non-success HTTP status onto the error taxonomy, carrying a
    /// body snippet for operator context.
    async fn map_status(
        &self,
        status: StatusCode,
        response: Response,
        context: &str,
    ) -> PlatformError {
        let body = response.text().await.unwrap_or_default();
        let snippet = body_snippet(&body);

        match status.as_u16() {
            401 | 403 => PlatformError::AuthExpired(format!(
                "{} rejected the access token ({}): {}",
                self.platform, context, snippet
            )),
            429 => PlatformError::RateLimited(format!(
                "{} reported rate limit exhaustion ({}): {}",
                self.platform, context, snippet
            )),
            400..=499 => PlatformError::PlatformRejected(format!(
                "{} rejected the request with {} ({}): {}",
                self.platform, status, context, snippet
            )),
            _ => PlatformError::Transient(format!(
                "{} server error {} ({}): {}",
                self.platform, status, context, snippet
            )),
        }
    }
}

fn body_snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

/// Parse a standard OAuth token response (`access_token`,
/// optional `refresh_token`, optional `expires_in`) into token material.
pub fn parse_oauth_token_response(
    platform: Platform,
    value: &Value,
) -> Result<crate::types::RefreshedToken> {
    let access_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PlatformError::Transient(format!(
                "{}: token endpoint returned no access_token",
                platform
            ))
        })?
        .to_string();

    let refresh_token = value
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::to_string);

    let expires_at = value
        .get("expires_in")
        .and_then(Value::as_i64)
        .map(|secs| chrono::Utc::now().timestamp() + secs);

    Ok(crate::types::RefreshedToken {
        access_token,
        refresh_token,
        expires_at,
    })
}

/// Parse rate-limit response headers into a snapshot.
///
/// Understands the `x-rate-limit-*` family (twitter) and the
/// IETF-draft `x-ratelimit-*` family the rest of the platforms use.
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<QuotaSnapshot> {
    let header_i64 = |names: &[&str]| -> Option<i64> {
        names.iter().find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        })
    };

    let limit = header_i64(&["x-rate-limit-limit", "x-ratelimit-limit"])?;
    let remaining = header_i64(&["x-rate-limit-remaining", "x-ratelimit-remaining"])?;
    let reset_at = header_i64(&["x-rate-limit-reset", "x-ratelimit-reset"]);

    Some(QuotaSnapshot {
        limit,
        remaining,
        reset_at,
    })
}
