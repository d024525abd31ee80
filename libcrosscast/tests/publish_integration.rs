//! Broadcast publishing integration tests
//!
//! Partial-failure aggregation and the pre-publish content transform,
//! end to end over the in-memory store and mock connectors.

use std::sync::Arc;

use libcrosscast::error::PlatformError;
use libcrosscast::platforms::mock::MockConnector;
use libcrosscast::platforms::{Connector, ConnectorRegistry};
use libcrosscast::service::{ConnectorService, RegisterRequest};
use libcrosscast::store::{MemoryStore, Store};
use libcrosscast::types::{Platform, PostDraft};
use libcrosscast::Config;

fn build_service(mocks: Vec<Arc<dyn Connector>>) -> (Arc<dyn Store>, ConnectorService) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = Arc::new(ConnectorRegistry::with_connectors(mocks));
    let service =
        ConnectorService::assemble(Arc::clone(&store), registry, &Config::default_config())
            .unwrap();
    (store, service)
}

async fn register(service: &ConnectorService, platform: Platform) -> i64 {
    service
        .register_connection(RegisterRequest {
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
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_partial_failure_is_reported_per_target() {
    let twitter = MockConnector::succeeding(Platform::Twitter);
    let linkedin = MockConnector::succeeding(Platform::Linkedin);
    let facebook = MockConnector::succeeding(Platform::Facebook);
    let instagram = MockConnector::failing_publish(
        Platform::Instagram,
        PlatformError::PlatformRejected("media required".to_string()),
    );

    let (store, service) = build_service(vec![
        twitter as Arc<dyn Connector>,
        linkedin,
        facebook,
        instagram,
    ]);

    let mut ids = Vec::new();
    for platform in [
        Platform::Twitter,
        Platform::Linkedin,
        Platform::Facebook,
        Platform::Instagram,
    ] {
        ids.push(register(&service, platform).await);
    }

    let report = service
        .publish(
            &ids,
            &PostDraft {
                content: "Our summer campaign is live!".to_string(),
                media_urls: vec![],
            },
        )
        .await
        .unwrap();

    // One entry per target, exactly one failure, never a single flag.
    assert_eq!(report.results.len(), 4);
    let failures: Vec<_> = report.results.iter().filter(|r| !r.success).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].platform, Platform::Instagram);
    assert!(failures[0].error.as_ref().unwrap().contains("media required"));

    // The three successes are persisted as posts; the failure is not.
    for result in &report.results {
        let count = store.count_posts(result.connection_id).await.unwrap();
        assert_eq!(count, if result.success { 1 } else { 0 });
    }
}

#[tokio::test]
async fn test_long_content_is_truncated_for_twitter() {
    let twitter = MockConnector::succeeding(Platform::Twitter);
    let (store, service) = build_service(vec![twitter.clone() as Arc<dyn Connector>]);
    let id = register(&service, Platform::Twitter).await;

    let content = format!("hello {}", "x".repeat(300));
    let report = service
        .publish(
            &[id],
            &PostDraft {
                content: content.clone(),
                media_urls: vec![],
            },
        )
        .await
        .unwrap();
    assert!(report.results[0].success);

    // The platform saw the transformed content.
    let sent = twitter.published_content();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chars().count(), 280);
    assert!(sent[0].ends_with('…'));

    // The stored post carries the transformed content too.
    let posts = store.posts_for_connection(id, 10).await.unwrap();
    assert!(posts[0].content.chars().count() <= 280);
    assert!(posts[0].content.ends_with('…'));

    // Determinism: the same draft renders to the same bytes again.
    let report = service
        .publish(
            &[id],
            &PostDraft {
                content,
                media_urls: vec![],
            },
        )
        .await
        .unwrap();
    assert!(report.results[0].success);
    let sent = twitter.published_content();
    assert_eq!(sent[0], sent[1]);
}

#[tokio::test]
async fn test_no_limit_platform_gets_full_content() {
    let facebook = MockConnector::succeeding(Platform::Facebook);
    let (_store, service) = build_service(vec![facebook.clone() as Arc<dyn Connector>]);
    let id = register(&service, Platform::Facebook).await;

    let content = "y".repeat(1000);
    service
        .publish(
            &[id],
            &PostDraft {
                content: content.clone(),
                media_urls: vec![],
            },
        )
        .await
        .unwrap();

    assert_eq!(facebook.published_content()[0], content);
}

#[tokio::test]
async fn test_published_post_starts_with_zero_engagement() {
    let twitter = MockConnector::succeeding(Platform::Twitter);
    let (store, service) = build_service(vec![twitter as Arc<dyn Connector>]);
    let id = register(&service, Platform::Twitter).await;

    service
        .publish(
            &[id],
            &PostDraft {
                content: "fresh post #new".to_string(),
                media_urls: vec!["https://cdn.example/img.png".to_string()],
            },
        )
        .await
        .unwrap();

    let posts = store.posts_for_connection(id, 10).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].likes_count, 0);
    assert_eq!(posts[0].comments_count, 0);
    assert_eq!(posts[0].shares_count, 0);
    assert_eq!(posts[0].engagement_rate, 0.0);
    assert_eq!(posts[0].media_urls, vec!["https://cdn.example/img.png"]);
    assert_eq!(posts[0].hashtags, vec!["new"]);
}
