//! `/api/social/*` routes
//!
//! Thin HTTP adapters over the connector service. Connection responses
//! are sanitized views (no token material). Publish responds 200 with a
//! per-target outcome because partial failure is data, not an HTTP
//! error; infrastructure failures map onto status codes below.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use libcrosscast::error::{CrosscastError, PlatformError};
use libcrosscast::service::{ConnectorService, RegisterRequest};
use libcrosscast::types::{ConnectionUpdate, Credentials, DateRange, Platform, PostDraft};

pub type AppState = Arc<ConnectorService>;

/// Build the full router.
pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/social/connections", get(list_connections))
        .route("/api/social/connections", post(create_connection))
        .route("/api/social/connections/:id", put(update_connection))
        .route("/api/social/connections/:id", delete(delete_connection))
        .route("/api/social/test-connection", post(test_connection))
        .route("/api/social/profile/:id", get(fetch_profile))
        .route("/api/social/metrics/:id", get(fetch_metrics))
        .route("/api/social/posts/:id", get(fetch_posts))
        .route("/api/social/publish/:id", post(publish))
        .with_state(service)
}

/// Local wrapper so library errors can carry HTTP semantics.
pub struct ApiError(CrosscastError);

impl From<CrosscastError> for ApiError {
    fn from(err: CrosscastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            CrosscastError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            CrosscastError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "InvalidInput"),
            CrosscastError::Platform(err) => match err {
                PlatformError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation"),
                PlatformError::AuthExpired(_) => (StatusCode::UNAUTHORIZED, "AuthExpired"),
                PlatformError::Revoked(_) => (StatusCode::UNAUTHORIZED, "Revoked"),
                PlatformError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RateLimited"),
                PlatformError::PlatformRejected(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "PlatformRejected")
                }
                PlatformError::Transient(_) => (StatusCode::BAD_GATEWAY, "Transient"),
            },
            CrosscastError::Config(_) | CrosscastError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal")
            }
        };

        let body = Json(json!({
            "error": kind,
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    user_id: i64,
}

async fn list_connections(
    State(service): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let connections = service.list_connections(params.user_id).await?;
    Ok(Json(connections))
}

async fn create_connection(
    State(service): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let connection = service.register_connection(request).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

async fn update_connection(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ConnectionUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    match service.update_connection(id, update).await? {
        Some(connection) => Ok(Json(connection)),
        None => Err(CrosscastError::NotFound(format!("connection {} does not exist", id)).into()),
    }
}

#[derive(Deserialize, Default)]
struct DeleteParams {
    #[serde(default)]
    purge: bool,
}

async fn delete_connection(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, ApiError> {
    if service.disconnect(id, params.purge).await? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(CrosscastError::NotFound(format!("connection {} does not exist", id)).into())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestConnectionRequest {
    platform: Platform,
    access_token: String,
    refresh_token: Option<String>,
}

/// Pre-onboarding validation. Always responds 200; the outcome is the
/// payload so the UI can surface the platform's reason verbatim.
async fn test_connection(
    State(service): State<AppState>,
    Json(request): Json<TestConnectionRequest>,
) -> Json<serde_json::Value> {
    let credentials = Credentials {
        access_token: request.access_token,
        refresh_token: request.refresh_token,
    };
    match service.test_connection(request.platform, &credentials).await {
        Ok(profile) => Json(json!({ "success": true, "profile": profile })),
        Err(err) => Json(json!({ "success": false, "error": err.to_string() })),
    }
}

async fn fetch_profile(
    State(service): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = service.fetch_profile(id).await?;
    Ok(Json(profile))
}

#[derive(Deserialize)]
struct MetricsParams {
    start: Option<i64>,
    end: Option<i64>,
}

async fn fetch_metrics(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<MetricsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let window = match (params.start, params.end) {
        (None, None) => None,
        (start, end) => {
            let end = end.unwrap_or_else(|| chrono_now());
            let start = start.unwrap_or(end - 30 * 86_400);
            Some(DateRange { start, end })
        }
    };
    let metrics = service.fetch_metrics(id, window).await?;
    Ok(Json(metrics))
}

#[derive(Deserialize)]
struct PostsParams {
    limit: Option<usize>,
    since: Option<i64>,
}

async fn fetch_posts(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PostsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let posts = service.fetch_posts(id, limit, params.since).await?;
    Ok(Json(posts))
}

/// Publish one post to one connection. Platform-side failure is a 200
/// with `success: false`; only infrastructure errors use HTTP status.
async fn publish(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Json(draft): Json<PostDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let report = service.publish(&[id], &draft).await?;
    let outcome = report.results.first();
    Ok(Json(json!({
        "success": outcome.is_some_and(|o| o.success),
        "postId": outcome.and_then(|o| o.platform_post_id.clone()),
        "error": outcome.and_then(|o| o.error.clone()),
        "broadcastId": report.broadcast_id,
    })))
}

fn chrono_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
