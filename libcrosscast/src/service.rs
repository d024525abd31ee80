//! Connector service facade
//!
//! Single entry point wiring the store, connector registry, token
//! manager, quota tracker, publisher, and sync orchestrator together.
//! The HTTP layer and the sync daemon consume only this; neither ever
//! touches a connector or the store directly.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::config::Config;
use crate::error::{CrosscastError, Result};
use crate::platforms::{Connector, ConnectorRegistry};
use crate::publish::Publisher;
use crate::quota::QuotaTracker;
use crate::store::{SqliteStore, Store};
use crate::sync::{SyncOrchestrator, SyncReport};
use crate::tokens::TokenManager;
use crate::types::{
    ConnectionUpdate, ConnectionView, Credentials, DateRange, Metrics, MetricsSnapshot, Platform,
    PostDraft, Profile, PublishReport, SocialConnection, SocialPost,
};

/// Request body for registering a connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_id: i64,
    pub client_id: Option<i64>,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub api_quota_limit: Option<i64>,
    pub scopes: Option<String>,
    pub webhook_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// Import without the onboarding validation call. The connection is
    /// born `Pending` until its first successful sync.
    #[serde(default)]
    pub skip_validation: bool,
}

pub struct ConnectorService {
    store: Arc<dyn Store>,
    registry: Arc<ConnectorRegistry>,
    tokens: Arc<TokenManager>,
    quota: Arc<QuotaTracker>,
    publisher: Publisher,
    sync: SyncOrchestrator,
}

impl ConnectorService {
    /// Production assembly: SQLite store plus real platform adapters.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&config.database.path).await?);
        let registry = Arc::new(ConnectorRegistry::from_config(config)?);
        Self::assemble(store, registry, config)
    }

    /// Assembly over explicit parts; tests bind `MemoryStore` and mock
    /// connectors here.
    pub fn assemble(
        store: Arc<dyn Store>,
        registry: Arc<ConnectorRegistry>,
        config: &Config,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.sync.refresh_margin()?,
        ));
        let quota = Arc::new(QuotaTracker::new(Arc::clone(&store)));
        let publisher = Publisher::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&tokens),
            Arc::clone(&quota),
        );
        let sync = SyncOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&tokens),
            Arc::clone(&quota),
            config.sync.workers,
            config.sync.post_page_size,
        );

        Ok(Self {
            store,
            registry,
            tokens,
            quota,
            publisher,
            sync,
        })
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    pub async fn list_connections(&self, user_id: i64) -> Result<Vec<ConnectionView>> {
        let now = chrono::Utc::now().timestamp();
        let connections = self.store.list_connections(user_id).await?;
        Ok(connections
            .iter()
            .map(|c| ConnectionView::from_connection(c, now))
            .collect())
    }

    /// Register a connection. Unless validation is skipped, credentials
    /// are validated with a minimal read call first and the profile from
    /// that call seeds the stored identity, so the connection is born
    /// active rather than pending.
    pub async fn register_connection(&self, request: RegisterRequest) -> Result<ConnectionView> {
        let credentials = Credentials {
            access_token: request.access_token.clone(),
            refresh_token: request.refresh_token.clone(),
        };

        let mut new = crate::types::NewConnection::new(
            request.user_id,
            request.platform,
            credentials.clone(),
        );
        new.client_id = request.client_id;
        new.token_expires_at = request.token_expires_at;
        new.api_quota_limit = request.api_quota_limit;
        new.scopes = request.scopes;
        new.webhook_url = request.webhook_url;
        new.metadata = request.metadata;

        if !request.skip_validation {
            let connector = self.registry.get(request.platform)?;
            let profile = connector.test_connection(&credentials).await?;
            new = new.with_profile(&profile);
        }

        let connection = self.store.insert_connection(new).await?;
        let now = chrono::Utc::now().timestamp();
        Ok(ConnectionView::from_connection(&connection, now))
    }

    pub async fn update_connection(
        &self,
        id: i64,
        update: ConnectionUpdate,
    ) -> Result<Option<ConnectionView>> {
        let now = chrono::Utc::now().timestamp();
        let updated = self.store.update_connection(id, update).await?;
        Ok(updated.map(|c| ConnectionView::from_connection(&c, now)))
    }

    /// Disconnect a connection. Soft-deletes (deactivate + purge token
    /// material) by default; `purge` hard-deletes the row and its
    /// metrics/posts.
    pub async fn disconnect(&self, id: i64, purge: bool) -> Result<bool> {
        let removed = if purge {
            self.store.delete_connection(id).await?
        } else {
            self.store.deactivate_connection(id).await?
        };
        if removed {
            self.tokens.forget(id);
        }
        Ok(removed)
    }

    /// Pre-onboarding credential validation. Nothing is persisted.
    pub async fn test_connection(
        &self,
        platform: Platform,
        credentials: &Credentials,
    ) -> Result<Profile> {
        let connector = self.registry.get(platform)?;
        connector.test_connection(credentials).await
    }

    // ------------------------------------------------------------------
    // On-demand fetches (fetch + persist + return)
    // ------------------------------------------------------------------

    pub async fn fetch_profile(&self, connection_id: i64) -> Result<Profile> {
        let connection = self.active_connection(connection_id).await?;
        let connector = self.registry.get(connection.platform)?;

        self.quota.acquire(&connection).await?;
        let profile = self
            .tokens
            .call_with_refresh(&connection, |fresh| {
                let connector = Arc::clone(&connector);
                async move { connector.fetch_profile(&fresh).await }
            })
            .await?;
        self.reconcile_quota(connection_id, connector.as_ref()).await;

        self.store.update_profile(connection.id, &profile).await?;
        Ok(profile)
    }

    pub async fn fetch_metrics(
        &self,
        connection_id: i64,
        window: Option<DateRange>,
    ) -> Result<Metrics> {
        let connection = self.active_connection(connection_id).await?;
        let connector = self.registry.get(connection.platform)?;

        self.quota.acquire(&connection).await?;
        let metrics = self
            .tokens
            .call_with_refresh(&connection, |fresh| {
                let connector = Arc::clone(&connector);
                async move { connector.fetch_metrics(&fresh, window).await }
            })
            .await?;
        self.reconcile_quota(connection_id, connector.as_ref()).await;

        let now = chrono::Utc::now().timestamp();
        self.store
            .upsert_metrics(&MetricsSnapshot {
                connection_id: connection.id,
                date: chrono::DateTime::from_timestamp(now, 0)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "1970-01-01".to_string()),
                metrics: metrics.clone(),
            })
            .await?;

        Ok(metrics)
    }

    pub async fn fetch_posts(
        &self,
        connection_id: i64,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<SocialPost>> {
        let connection = self.active_connection(connection_id).await?;
        let connector = self.registry.get(connection.platform)?;

        self.quota.acquire(&connection).await?;
        let fetched = self
            .tokens
            .call_with_refresh(&connection, |fresh| {
                let connector = Arc::clone(&connector);
                async move { connector.fetch_posts(&fresh, limit, since).await }
            })
            .await?;
        self.reconcile_quota(connection_id, connector.as_ref()).await;

        let now = chrono::Utc::now().timestamp();
        let mut posts = Vec::with_capacity(fetched.len());
        for post in fetched {
            let post = SocialPost::from_fetched(connection.id, post, now);
            self.store.upsert_post(&post).await?;
            posts.push(post);
        }
        Ok(posts)
    }

    // ------------------------------------------------------------------
    // Publishing and sync
    // ------------------------------------------------------------------

    /// Publish one draft to the given connections. Unknown ids fail the
    /// whole request; everything past resolution is per-target.
    pub async fn publish(&self, connection_ids: &[i64], draft: &PostDraft) -> Result<PublishReport> {
        let mut targets = Vec::with_capacity(connection_ids.len());
        for &id in connection_ids {
            targets.push(self.connection(id).await?);
        }
        self.publisher.broadcast(&targets, draft).await
    }

    /// Run one sync cycle over every active connection.
    pub async fn run_sync_cycle(&self) -> Result<SyncReport> {
        self.sync.run_cycle().await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn connection(&self, id: i64) -> Result<SocialConnection> {
        self.store.get_connection(id).await?.ok_or_else(|| {
            CrosscastError::NotFound(format!("connection {} does not exist", id))
        })
    }

    async fn active_connection(&self, id: i64) -> Result<SocialConnection> {
        let connection = self.connection(id).await?;
        if !connection.is_active {
            return Err(CrosscastError::InvalidInput(format!(
                "connection {} is not active",
                id
            )));
        }
        Ok(connection)
    }

    async fn reconcile_quota(&self, connection_id: i64, connector: &dyn Connector) {
        if let Err(err) = self.quota.reconcile_from(connection_id, connector).await {
            warn!(connection_id, "Quota reconcile failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platforms::mock::MockConnector;
    use crate::store::MemoryStore;
    use crate::types::ConnectionStatus;

    fn service_with(
        mocks: Vec<Arc<dyn Connector>>,
    ) -> (Arc<dyn Store>, ConnectorService) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectorRegistry::with_connectors(mocks));
        let service = ConnectorService::assemble(
            Arc::clone(&store),
            registry,
            &Config::default_config(),
        )
        .unwrap();
        (store, service)
    }

    fn register_request(platform: Platform) -> RegisterRequest {
        RegisterRequest {
            user_id: 1,
            client_id: None,
            platform,
            access_token: "tok".to_string(),
            refresh_token: Some("ref".to_string()),
            token_expires_at: None,
            api_quota_limit: None,
            scopes: None,
            webhook_url: None,
            metadata: None,
            skip_validation: false,
        }
    }

    #[tokio::test]
    async fn test_register_validates_and_seeds_profile() {
        let mock = MockConnector::succeeding(Platform::Twitter);
        let (_store, service) = service_with(vec![mock.clone() as Arc<dyn Connector>]);

        let view = service
            .register_connection(register_request(Platform::Twitter))
            .await
            .unwrap();

        assert_eq!(mock.profile_calls(), 1);
        assert_eq!(view.username, "twitter-brand");
        assert_eq!(view.follower_count, 1000);
        assert_eq!(view.status, ConnectionStatus::Active);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_credentials() {
        let mock = MockConnector::failing(
            Platform::Twitter,
            PlatformError::AuthExpired("bad token".to_string()),
        );
        let (store, service) = service_with(vec![mock as Arc<dyn Connector>]);

        let result = service
            .register_connection(register_request(Platform::Twitter))
            .await;
        assert!(result.is_err());
        assert!(store.list_connections(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_skip_validation_is_pending() {
        let mock = MockConnector::succeeding(Platform::Twitter);
        let (_store, service) = service_with(vec![mock.clone() as Arc<dyn Connector>]);

        let mut request = register_request(Platform::Twitter);
        request.skip_validation = true;
        let view = service.register_connection(request).await.unwrap();

        assert_eq!(mock.profile_calls(), 0);
        assert_eq!(view.status, ConnectionStatus::Pending);
    }

    #[tokio::test]
    async fn test_fetch_profile_persists() {
        let mock = MockConnector::succeeding(Platform::Twitter);
        let (store, service) = service_with(vec![mock as Arc<dyn Connector>]);

        let view = service
            .register_connection(register_request(Platform::Twitter))
            .await
            .unwrap();

        let profile = service.fetch_profile(view.id).await.unwrap();
        assert_eq!(profile.follower_count, 1000);

        let stored = store.get_connection(view.id).await.unwrap().unwrap();
        assert_eq!(stored.follower_count, 1000);
        assert!(stored.api_quota_used > 0, "quota consumed by the fetch");
    }

    #[tokio::test]
    async fn test_fetch_profile_unknown_connection() {
        let (_store, service) =
            service_with(vec![MockConnector::succeeding(Platform::Twitter) as Arc<dyn Connector>]);

        let err = service.fetch_profile(404).await.unwrap_err();
        assert!(matches!(err, CrosscastError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_disconnect_soft_then_purge() {
        let mock = MockConnector::succeeding(Platform::Twitter);
        let (store, service) = service_with(vec![mock as Arc<dyn Connector>]);

        let view = service
            .register_connection(register_request(Platform::Twitter))
            .await
            .unwrap();

        assert!(service.disconnect(view.id, false).await.unwrap());
        let stored = store.get_connection(view.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.access_token.is_empty());

        assert!(service.disconnect(view.id, true).await.unwrap());
        assert!(store.get_connection(view.id).await.unwrap().is_none());
        assert!(!service.disconnect(view.id, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_to_unknown_connection_fails_whole_request() {
        let (_store, service) =
            service_with(vec![MockConnector::succeeding(Platform::Twitter) as Arc<dyn Connector>]);

        let err = service
            .publish(
                &[99],
                &PostDraft {
                    content: "hello".to_string(),
                    media_urls: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CrosscastError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_to_disconnected_target_is_per_target_failure() {
        let mock = MockConnector::succeeding(Platform::Twitter);
        let (_store, service) = service_with(vec![mock.clone() as Arc<dyn Connector>]);

        let view = service
            .register_connection(register_request(Platform::Twitter))
            .await
            .unwrap();
        service.disconnect(view.id, false).await.unwrap();

        let report = service
            .publish(
                &[view.id],
                &PostDraft {
                    content: "hello".to_string(),
                    media_urls: vec![],
                },
            )
            .await
            .unwrap();

        assert_eq!(report.results.len(), 1);
        assert!(!report.results[0].success);
        assert_eq!(mock.publish_calls(), 0);
    }
}
