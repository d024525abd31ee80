//! Multi-connection publishing
//!
//! Broadcasts one authored post to N target connections. Every target is
//! invoked independently and concurrently, and the aggregate is a list
//! of per-target outcomes — partial success (3 of 4 platforms) is the
//! expected common case, never an exception. A successfully published
//! post is persisted immediately with zero engagement counts; the sync
//! orchestrator backfills counts on its next pass.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{CrosscastError, PlatformError, Result};
use crate::platforms::{Connector, ConnectorRegistry};
use crate::quota::QuotaTracker;
use crate::store::Store;
use crate::tokens::TokenManager;
use crate::transform;
use crate::types::{PostDraft, PublishOutcome, PublishReport, SocialConnection, SocialPost};

pub struct Publisher {
    store: Arc<dyn Store>,
    registry: Arc<ConnectorRegistry>,
    tokens: Arc<TokenManager>,
    quota: Arc<QuotaTracker>,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ConnectorRegistry>,
        tokens: Arc<TokenManager>,
        quota: Arc<QuotaTracker>,
    ) -> Self {
        Self {
            store,
            registry,
            tokens,
            quota,
        }
    }

    /// Broadcast `draft` to every target connection concurrently.
    ///
    /// Local validation failures reject the whole broadcast before
    /// anything is sent; everything after that is scoped per target.
    pub async fn broadcast(
        &self,
        targets: &[SocialConnection],
        draft: &PostDraft,
    ) -> Result<PublishReport> {
        transform::validate_draft(&draft.content)?;

        let broadcast_id = uuid::Uuid::new_v4().to_string();
        info!(
            broadcast_id = %broadcast_id,
            targets = targets.len(),
            "Broadcasting post"
        );

        let futures = targets
            .iter()
            .map(|connection| self.publish_one(connection, draft));
        let results = join_all(futures).await;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            broadcast_id = %broadcast_id,
            succeeded,
            failed = results.len() - succeeded,
            "Broadcast finished"
        );

        Ok(PublishReport {
            broadcast_id,
            results,
        })
    }

    async fn publish_one(&self, connection: &SocialConnection, draft: &PostDraft) -> PublishOutcome {
        match self.try_publish(connection, draft).await {
            Ok(post_id) => {
                info!(
                    connection_id = connection.id,
                    platform = %connection.platform,
                    post_id = %post_id,
                    "Published post"
                );
                PublishOutcome {
                    connection_id: connection.id,
                    platform: connection.platform,
                    success: true,
                    platform_post_id: Some(post_id),
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    connection_id = connection.id,
                    platform = %connection.platform,
                    "Publish failed: {}",
                    err
                );
                PublishOutcome {
                    connection_id: connection.id,
                    platform: connection.platform,
                    success: false,
                    platform_post_id: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn try_publish(&self, connection: &SocialConnection, draft: &PostDraft) -> Result<String> {
        if !connection.is_active {
            let reason = connection
                .revoked_reason
                .clone()
                .unwrap_or_else(|| "connection is disconnected".to_string());
            return Err(PlatformError::Revoked(reason).into());
        }

        let connector = self.registry.get(connection.platform)?;

        // Platform constraints are transforms, not rejections.
        let content = transform::render_for_platform(&draft.content, connection.platform);

        self.quota.acquire(connection).await?;

        let post_id = self
            .tokens
            .call_with_refresh(connection, |fresh| {
                let connector = Arc::clone(&connector);
                let content = content.clone();
                let media_urls = draft.media_urls.clone();
                async move {
                    publish_with_retry(connector.as_ref(), &fresh, &content, &media_urls).await
                }
            })
            .await?;

        if let Err(err) = self
            .quota
            .reconcile_from(connection.id, connector.as_ref())
            .await
        {
            warn!(connection_id = connection.id, "Quota reconcile failed: {}", err);
        }

        let now = chrono::Utc::now().timestamp();
        let post = SocialPost {
            id: None,
            connection_id: connection.id,
            platform_post_id: post_id.clone(),
            hashtags: transform::extract_hashtags(&content),
            mentions: transform::extract_mentions(&content),
            content,
            media_urls: draft.media_urls.clone(),
            likes_count: 0,
            comments_count: 0,
            shares_count: 0,
            engagement_rate: 0.0,
            published_at: Some(now),
            fetched_at: now,
        };
        self.store.upsert_post(&post).await?;

        Ok(post_id)
    }
}

/// Publish with a bounded retry for transient failures only.
///
/// Rate-limit errors are not retried in place: the budget will not
/// recover within a request's lifetime. Business-rule rejections and
/// auth errors are handled elsewhere or not at all.
async fn publish_with_retry(
    connector: &dyn Connector,
    connection: &SocialConnection,
    content: &str,
    media_urls: &[String],
) -> Result<String> {
    const MAX_ATTEMPTS: u32 = 3;

    let mut attempt = 1;
    loop {
        match connector.publish(connection, content, media_urls).await {
            Ok(post_id) => {
                if attempt > 1 {
                    info!(
                        platform = %connection.platform,
                        attempt,
                        "Publish succeeded after retry"
                    );
                }
                return Ok(post_id);
            }
            Err(err) => {
                let retryable = matches!(
                    err,
                    CrosscastError::Platform(PlatformError::Transient(_))
                );
                if !retryable || attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                let delay_secs = 2_u64.pow(attempt - 1);
                warn!(
                    platform = %connection.platform,
                    attempt,
                    "Transient publish failure: {}. Retrying in {}s",
                    err,
                    delay_secs
                );
                sleep(Duration::from_secs(delay_secs)).await;
                attempt += 1;
            }
        }
    }
}
