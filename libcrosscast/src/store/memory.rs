//! In-memory store for tests
//!
//! Mirrors the SQLite backend's observable behavior (identity
//! uniqueness, upsert keys, token purging) without touching disk.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CrosscastError, Result};
use crate::store::Store;
use crate::types::{
    ConnectionUpdate, MetricsSnapshot, NewConnection, Profile, SocialConnection, SocialPost,
};

#[derive(Default)]
struct Inner {
    next_connection_id: i64,
    next_post_id: i64,
    connections: HashMap<i64, SocialConnection>,
    // Keyed by (connection_id, date)
    metrics: HashMap<(i64, String), MetricsSnapshot>,
    // Keyed by (connection_id, platform_post_id)
    posts: HashMap<(i64, String), SocialPost>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_connection(&self, new: NewConnection) -> Result<SocialConnection> {
        let mut inner = self.inner.lock().unwrap();

        let duplicate = inner.connections.values().any(|c| {
            c.is_active
                && c.user_id == new.user_id
                && c.platform == new.platform
                && c.platform_user_id == new.platform_user_id
        });
        if duplicate {
            return Err(CrosscastError::InvalidInput(format!(
                "An active {} connection for this identity already exists",
                new.platform
            )));
        }

        inner.next_connection_id += 1;
        let id = inner.next_connection_id;
        let connection = SocialConnection {
            id,
            user_id: new.user_id,
            client_id: new.client_id,
            platform: new.platform,
            username: new.username,
            platform_user_id: new.platform_user_id,
            profile_url: new.profile_url,
            avatar_url: new.avatar_url,
            follower_count: new.follower_count,
            following_count: new.following_count,
            post_count: new.post_count,
            access_token: new.access_token,
            refresh_token: new.refresh_token,
            token_expires_at: new.token_expires_at,
            api_quota_used: 0,
            api_quota_limit: new
                .api_quota_limit
                .unwrap_or_else(|| new.platform.default_quota_limit()),
            quota_window_started_at: 0,
            scopes: new.scopes,
            webhook_url: new.webhook_url,
            is_active: true,
            revoked_reason: None,
            last_sync_at: None,
            metadata: new.metadata,
            created_at: chrono::Utc::now().timestamp(),
        };
        inner.connections.insert(id, connection.clone());
        Ok(connection)
    }

    async fn get_connection(&self, id: i64) -> Result<Option<SocialConnection>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.connections.get(&id).cloned())
    }

    async fn list_connections(&self, user_id: i64) -> Result<Vec<SocialConnection>> {
        let inner = self.inner.lock().unwrap();
        let mut connections: Vec<_> = inner
            .connections
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        connections.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(connections)
    }

    async fn list_active_connections(&self) -> Result<Vec<SocialConnection>> {
        let inner = self.inner.lock().unwrap();
        let mut connections: Vec<_> = inner
            .connections
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        connections.sort_by_key(|c| c.id);
        Ok(connections)
    }

    async fn update_connection(
        &self,
        id: i64,
        update: ConnectionUpdate,
    ) -> Result<Option<SocialConnection>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(conn) = inner.connections.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(client_id) = update.client_id {
            conn.client_id = Some(client_id);
        }
        if let Some(username) = update.username {
            conn.username = username;
        }
        if let Some(profile_url) = update.profile_url {
            conn.profile_url = Some(profile_url);
        }
        if let Some(avatar_url) = update.avatar_url {
            conn.avatar_url = Some(avatar_url);
        }
        if let Some(limit) = update.api_quota_limit {
            conn.api_quota_limit = limit;
        }
        if let Some(scopes) = update.scopes {
            conn.scopes = Some(scopes);
        }
        if let Some(webhook_url) = update.webhook_url {
            conn.webhook_url = Some(webhook_url);
        }
        if let Some(is_active) = update.is_active {
            conn.is_active = is_active;
        }
        if let Some(metadata) = update.metadata {
            conn.metadata = Some(metadata);
        }

        Ok(Some(conn.clone()))
    }

    async fn deactivate_connection(&self, id: i64) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(conn) = inner.connections.get_mut(&id) else {
            return Ok(false);
        };
        conn.is_active = false;
        conn.access_token = String::new();
        conn.refresh_token = None;
        Ok(true)
    }

    async fn delete_connection(&self, id: i64) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.connections.remove(&id).is_some();
        inner.metrics.retain(|(conn_id, _), _| *conn_id != id);
        inner.posts.retain(|(conn_id, _), _| *conn_id != id);
        Ok(existed)
    }

    async fn update_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.get_mut(&id) {
            conn.access_token = access_token.to_string();
            if let Some(refresh) = refresh_token {
                conn.refresh_token = Some(refresh.to_string());
            }
            conn.token_expires_at = expires_at;
        }
        Ok(())
    }

    async fn mark_revoked(&self, id: i64, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.get_mut(&id) {
            conn.is_active = false;
            conn.revoked_reason = Some(reason.to_string());
            conn.access_token = String::new();
            conn.refresh_token = None;
        }
        Ok(())
    }

    async fn update_profile(&self, id: i64, profile: &Profile) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.get_mut(&id) {
            conn.username = profile.username.clone();
            conn.platform_user_id = profile.platform_user_id.clone();
            conn.profile_url = profile.profile_url.clone();
            conn.avatar_url = profile.avatar_url.clone();
            conn.follower_count = profile.follower_count;
            conn.following_count = profile.following_count;
            conn.post_count = profile.post_count;
        }
        Ok(())
    }

    async fn update_quota(&self, id: i64, used: i64, window_started_at: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.get_mut(&id) {
            conn.api_quota_used = used;
            conn.quota_window_started_at = window_started_at;
        }
        Ok(())
    }

    async fn set_last_sync(&self, id: i64, synced_at: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.get_mut(&id) {
            conn.last_sync_at = Some(synced_at);
        }
        Ok(())
    }

    async fn upsert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.metrics.insert(
            (snapshot.connection_id, snapshot.date.clone()),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn metrics_in_range(
        &self,
        connection_id: i64,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<MetricsSnapshot>> {
        let inner = self.inner.lock().unwrap();
        let mut snapshots: Vec<_> = inner
            .metrics
            .values()
            .filter(|s| {
                s.connection_id == connection_id
                    && s.date.as_str() >= start_date
                    && s.date.as_str() <= end_date
            })
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(snapshots)
    }

    async fn upsert_post(&self, post: &SocialPost) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let key = (post.connection_id, post.platform_post_id.clone());

        if let Some(existing) = inner.posts.get_mut(&key) {
            // Counts update, identity and content do not.
            existing.likes_count = post.likes_count;
            existing.comments_count = post.comments_count;
            existing.shares_count = post.shares_count;
            existing.engagement_rate = post.engagement_rate;
            existing.fetched_at = post.fetched_at;
        } else {
            inner.next_post_id += 1;
            let mut stored = post.clone();
            stored.id = Some(inner.next_post_id);
            inner.posts.insert(key, stored);
        }
        Ok(())
    }

    async fn posts_for_connection(
        &self,
        connection_id: i64,
        limit: usize,
    ) -> Result<Vec<SocialPost>> {
        let inner = self.inner.lock().unwrap();
        let mut posts: Vec<_> = inner
            .posts
            .values()
            .filter(|p| p.connection_id == connection_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        posts.truncate(limit);
        Ok(posts)
    }

    async fn count_posts(&self, connection_id: i64) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .posts
            .values()
            .filter(|p| p.connection_id == connection_id)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Credentials, Platform};

    fn sample(user_id: i64, platform: Platform) -> NewConnection {
        let mut new = NewConnection::new(
            user_id,
            platform,
            Credentials {
                access_token: "tok".to_string(),
                refresh_token: None,
            },
        );
        new.platform_user_id = "remote-1".to_string();
        new
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryStore::new();
        let a = store
            .insert_connection(sample(1, Platform::Twitter))
            .await
            .unwrap();
        let b = store
            .insert_connection(sample(1, Platform::Instagram))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_duplicate_active_identity_rejected() {
        let store = MemoryStore::new();
        store
            .insert_connection(sample(1, Platform::Twitter))
            .await
            .unwrap();
        assert!(store
            .insert_connection(sample(1, Platform::Twitter))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_deactivate_purges_tokens() {
        let store = MemoryStore::new();
        let conn = store
            .insert_connection(sample(1, Platform::Twitter))
            .await
            .unwrap();

        assert!(store.deactivate_connection(conn.id).await.unwrap());
        let conn = store.get_connection(conn.id).await.unwrap().unwrap();
        assert!(!conn.is_active);
        assert!(conn.access_token.is_empty());

        // Identity freed up for a new connection.
        store
            .insert_connection(sample(1, Platform::Twitter))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let conn = store
            .insert_connection(sample(1, Platform::Twitter))
            .await
            .unwrap();

        let post = SocialPost {
            id: None,
            connection_id: conn.id,
            platform_post_id: "p-1".to_string(),
            content: "original".to_string(),
            media_urls: vec![],
            hashtags: vec![],
            mentions: vec![],
            likes_count: 1,
            comments_count: 0,
            shares_count: 0,
            engagement_rate: 0.0,
            published_at: Some(100),
            fetched_at: 100,
        };
        store.upsert_post(&post).await.unwrap();
        store.upsert_post(&post).await.unwrap();
        assert_eq!(store.count_posts(conn.id).await.unwrap(), 1);
    }
}
