//! Token lifecycle management
//!
//! Guarantees at most one in-flight refresh per connection. Every caller
//! that observes an expired (or about-to-expire) token either waits for
//! the in-flight refresh and reuses its result, or initiates exactly
//! one. New token material is persisted before the lock is released, so
//! waiters re-reading the connection always observe the winner's token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{CrosscastError, PlatformError, Result};
use crate::platforms::ConnectorRegistry;
use crate::store::Store;
use crate::types::SocialConnection;

pub struct TokenManager {
    store: Arc<dyn Store>,
    registry: Arc<ConnectorRegistry>,
    // One async lock per connection id, created on first use. The outer
    // std mutex only guards the map, never held across await.
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    refresh_margin_secs: i64,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ConnectorRegistry>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            locks: Mutex::new(HashMap::new()),
            refresh_margin_secs: refresh_margin.as_secs() as i64,
        }
    }

    /// Return a connection whose token is usable, refreshing first when
    /// it is expired or inside the refresh margin.
    pub async fn ensure_fresh(&self, connection: &SocialConnection) -> Result<SocialConnection> {
        let now = chrono::Utc::now().timestamp();
        if !connection.token_expires_within(now, self.refresh_margin_secs) {
            return Ok(connection.clone());
        }
        self.refresh(connection).await
    }

    /// Single-flight refresh. Returns the connection with its
    /// post-refresh token material.
    ///
    /// `connection` is the row as the caller observed it; if the stored
    /// token already differs by the time the lock is acquired, another
    /// caller's refresh is reused instead of repeated. The expiry clock
    /// is deliberately not consulted here: a reactive rejection means
    /// the platform disagrees with the local clock, and the platform
    /// wins.
    pub async fn refresh(&self, connection: &SocialConnection) -> Result<SocialConnection> {
        let lock = self.lock_for(connection.id);
        let _guard = lock.lock().await;

        // Re-read under the lock.
        let current = self
            .store
            .get_connection(connection.id)
            .await?
            .ok_or_else(|| {
                CrosscastError::NotFound(format!("connection {} does not exist", connection.id))
            })?;

        if !current.is_active {
            // A previous refresh already failed permanently; fail fast
            // instead of retrying a refresh that is known to be broken.
            let reason = current
                .revoked_reason
                .clone()
                .unwrap_or_else(|| "connection is disconnected".to_string());
            return Err(PlatformError::Revoked(reason).into());
        }

        let now = chrono::Utc::now().timestamp();
        if current.access_token != connection.access_token && !current.token_expired(now) {
            // Refreshed while this caller waited on the lock.
            return Ok(current);
        }

        let connector = self.registry.get(current.platform)?;
        match connector.refresh_token(&current).await {
            Ok(token) => {
                self.store
                    .update_tokens(
                        current.id,
                        &token.access_token,
                        token.refresh_token.as_deref(),
                        token.expires_at,
                    )
                    .await?;
                info!(
                    connection_id = current.id,
                    platform = %current.platform,
                    "Refreshed access token"
                );
                self.store
                    .get_connection(current.id)
                    .await?
                    .ok_or_else(|| {
                        CrosscastError::NotFound(format!(
                            "connection {} vanished during refresh",
                            current.id
                        ))
                    })
            }
            Err(CrosscastError::Platform(err)) if err.is_permanent_auth_failure() => {
                warn!(
                    connection_id = current.id,
                    platform = %current.platform,
                    "Refresh grant rejected; marking connection revoked: {}",
                    err
                );
                self.store.mark_revoked(current.id, &err.to_string()).await?;
                Err(err.into())
            }
            Err(err) => {
                // Transient refresh failure: the triggering request
                // surfaces an auth error; its own retry policy decides
                // what happens next. Nothing is persisted.
                warn!(
                    connection_id = current.id,
                    platform = %current.platform,
                    "Token refresh failed: {}",
                    err
                );
                Err(PlatformError::AuthExpired(format!(
                    "token refresh failed for connection {}: {}",
                    current.id, err
                ))
                .into())
            }
        }
    }

    /// Run a platform call with a usable token, retrying exactly once
    /// after a refresh when the platform rejects the token reactively.
    pub async fn call_with_refresh<T, F, Fut>(
        &self,
        connection: &SocialConnection,
        call: F,
    ) -> Result<T>
    where
        F: Fn(SocialConnection) -> Fut,
        Fut: Future<Output = Result<T>> + Send,
    {
        let fresh = self.ensure_fresh(connection).await?;
        match call(fresh.clone()).await {
            Err(CrosscastError::Platform(PlatformError::AuthExpired(_))) => {
                let refreshed = self.refresh(&fresh).await?;
                call(refreshed).await
            }
            other => other,
        }
    }

    fn lock_for(&self, connection_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry for a removed connection.
    pub fn forget(&self, connection_id: i64) {
        self.locks.lock().unwrap().remove(&connection_id);
    }
}
