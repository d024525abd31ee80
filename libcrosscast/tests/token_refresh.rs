//! Token lifecycle integration tests
//!
//! The onboarding-to-expiry scenarios: an expired connection's metrics
//! fetch triggers exactly one refresh and succeeds without surfacing an
//! error; concurrent calls share one refresh; a rejected grant revokes
//! the connection.

use std::sync::Arc;
use std::time::Duration;

use libcrosscast::error::{CrosscastError, PlatformError};
use libcrosscast::platforms::mock::{MockConfig, MockConnector};
use libcrosscast::platforms::{Connector, ConnectorRegistry};
use libcrosscast::service::{ConnectorService, RegisterRequest};
use libcrosscast::store::{MemoryStore, Store};
use libcrosscast::types::{ConnectionStatus, Platform};
use libcrosscast::Config;

fn build_service(mocks: Vec<Arc<dyn Connector>>) -> (Arc<dyn Store>, Arc<ConnectorService>) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = Arc::new(ConnectorRegistry::with_connectors(mocks));
    let service = Arc::new(
        ConnectorService::assemble(Arc::clone(&store), registry, &Config::default_config())
            .unwrap(),
    );
    (store, service)
}

async fn register_expired(service: &ConnectorService, expires_at: i64) -> i64 {
    service
        .register_connection(RegisterRequest {
            user_id: 1,
            client_id: None,
            platform: Platform::Twitter,
            access_token: "stale-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_expires_at: Some(expires_at),
            api_quota_limit: None,
            scopes: None,
            webhook_url: None,
            metadata: None,
            skip_validation: false,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_expired_connection_metrics_refreshes_once_and_succeeds() {
    let now = chrono::Utc::now().timestamp();

    // The platform only accepts the refreshed token, so the fetch can
    // succeed solely through the refresh path.
    let mut config = MockConfig::new(Platform::Twitter);
    config.expected_token = Some("refreshed-token".to_string());
    let mock = MockConnector::new(config);

    let (store, service) = build_service(vec![mock.clone() as Arc<dyn Connector>]);
    let id = register_expired(&service, now - 3600).await;

    let metrics = service.fetch_metrics(id, None).await.unwrap();
    assert_eq!(metrics.followers, 1000);

    // Exactly one refresh, new expiry persisted in the future.
    assert_eq!(mock.refresh_calls(), 1);
    let connection = store.get_connection(id).await.unwrap().unwrap();
    assert_eq!(connection.access_token, "refreshed-token");
    assert!(connection.token_expires_at.unwrap() > now);
    assert_eq!(connection.status(now), ConnectionStatus::Active);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_refresh() {
    let now = chrono::Utc::now().timestamp();

    let mut config = MockConfig::new(Platform::Twitter);
    config.expected_token = Some("refreshed-token".to_string());
    config.delay = Duration::from_millis(25);
    let mock = MockConnector::new(config);

    let (_store, service) = build_service(vec![mock.clone() as Arc<dyn Connector>]);
    let id = register_expired(&service, now - 60).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(
            async move { service.fetch_metrics(id, None).await },
        ));
    }

    for handle in handles {
        let metrics = handle.await.unwrap().unwrap();
        assert_eq!(metrics.followers, 1000);
    }

    assert_eq!(mock.refresh_calls(), 1);
}

#[tokio::test]
async fn test_rejected_grant_revokes_connection_and_surfaces_reason() {
    let now = chrono::Utc::now().timestamp();

    let mut config = MockConfig::new(Platform::Twitter);
    config.refresh_error = Some(PlatformError::Revoked(
        "invalid_grant: refresh token revoked by user".to_string(),
    ));
    let mock = MockConnector::new(config);

    let (store, service) = build_service(vec![mock.clone() as Arc<dyn Connector>]);
    let id = register_expired(&service, now - 3600).await;

    let err = service.fetch_metrics(id, None).await.unwrap_err();
    assert!(matches!(
        err,
        CrosscastError::Platform(PlatformError::Revoked(_))
    ));

    // The UI-facing view shows `revoked` with a user-visible reason, so
    // re-authentication is prompted only here.
    let views = service.list_connections(1).await.unwrap();
    assert_eq!(views[0].status, ConnectionStatus::Revoked);
    assert!(views[0]
        .revoked_reason
        .as_ref()
        .unwrap()
        .contains("invalid_grant"));

    // Fail-fast afterwards: no further refresh attempts.
    let _ = service.fetch_metrics(id, None).await;
    assert_eq!(mock.refresh_calls(), 1);

    // Token material was purged on revocation.
    let connection = store.get_connection(id).await.unwrap().unwrap();
    assert!(connection.access_token.is_empty());
    assert!(connection.refresh_token.is_none());
}
