//! Quota gating integration tests
//!
//! The proactive gate: once the persisted budget is exhausted, calls
//! come back `RateLimited` without any outbound request until the
//! platform's reset window elapses.

use std::sync::Arc;

use libcrosscast::error::{CrosscastError, PlatformError};
use libcrosscast::platforms::mock::MockConnector;
use libcrosscast::platforms::{Connector, ConnectorRegistry};
use libcrosscast::service::{ConnectorService, RegisterRequest};
use libcrosscast::store::{MemoryStore, Store};
use libcrosscast::types::{ConnectionStatus, Platform};
use libcrosscast::Config;

fn build_service(mocks: Vec<Arc<dyn Connector>>) -> (Arc<dyn Store>, ConnectorService) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = Arc::new(ConnectorRegistry::with_connectors(mocks));
    let service =
        ConnectorService::assemble(Arc::clone(&store), registry, &Config::default_config())
            .unwrap();
    (store, service)
}

async fn register_with_limit(service: &ConnectorService, limit: i64) -> i64 {
    service
        .register_connection(RegisterRequest {
            user_id: 1,
            client_id: None,
            platform: Platform::Twitter,
            access_token: "tok".to_string(),
            refresh_token: None,
            token_expires_at: None,
            api_quota_limit: Some(limit),
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
async fn test_exhausted_budget_blocks_without_outbound_call() {
    let mock = MockConnector::succeeding(Platform::Twitter);
    let (_store, service) = build_service(vec![mock.clone() as Arc<dyn Connector>]);

    // Two units of budget: both consumed by profile fetches.
    let id = register_with_limit(&service, 2).await;
    let calls_after_register = mock.total_calls();

    service.fetch_profile(id).await.unwrap();
    service.fetch_profile(id).await.unwrap();
    let calls_after_fetches = mock.total_calls();
    assert_eq!(calls_after_fetches, calls_after_register + 2);

    // Budget gone: the gate fires before the connector is touched.
    let err = service.fetch_profile(id).await.unwrap_err();
    assert!(matches!(
        err,
        CrosscastError::Platform(PlatformError::RateLimited(_))
    ));
    assert_eq!(mock.total_calls(), calls_after_fetches);

    // The connection surfaces as rate limited, not broken.
    let views = service.list_connections(1).await.unwrap();
    assert_eq!(views[0].status, ConnectionStatus::RateLimited);
}

#[tokio::test]
async fn test_budget_returns_after_reset_window() {
    let mock = MockConnector::succeeding(Platform::Twitter);
    let (store, service) = build_service(vec![mock.clone() as Arc<dyn Connector>]);

    let id = register_with_limit(&service, 1).await;
    service.fetch_profile(id).await.unwrap();
    assert!(service.fetch_profile(id).await.is_err());

    // Rewind the window anchor past the platform's reset window, as if
    // the window had elapsed in real time.
    let connection = store.get_connection(id).await.unwrap().unwrap();
    let elapsed_anchor = connection.quota_window_started_at
        - Platform::Twitter.quota_window_secs()
        - 1;
    store
        .update_quota(id, connection.api_quota_used, elapsed_anchor)
        .await
        .unwrap();

    // The budget is back and the counter restarted.
    service.fetch_profile(id).await.unwrap();
    let connection = store.get_connection(id).await.unwrap().unwrap();
    assert_eq!(connection.api_quota_used, 1);
}

#[tokio::test]
async fn test_quota_counters_persist_across_service_instances() {
    let mock = MockConnector::succeeding(Platform::Twitter);
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = Arc::new(ConnectorRegistry::with_connectors(vec![
        mock.clone() as Arc<dyn Connector>
    ]));

    let service = ConnectorService::assemble(
        Arc::clone(&store),
        Arc::clone(&registry),
        &Config::default_config(),
    )
    .unwrap();
    let id = register_with_limit(&service, 2).await;
    service.fetch_profile(id).await.unwrap();
    service.fetch_profile(id).await.unwrap();
    drop(service);

    // A new service over the same store observes the spent budget;
    // restarts do not refill the bucket.
    let service =
        ConnectorService::assemble(Arc::clone(&store), registry, &Config::default_config())
            .unwrap();
    let err = service.fetch_profile(id).await.unwrap_err();
    assert!(matches!(
        err,
        CrosscastError::Platform(PlatformError::RateLimited(_))
    ));
}
