//! Static connector registry
//!
//! All adapters are resolved once at process startup, keyed by the
//! closed `Platform` enum. The construction match is exhaustive, so a
//! platform without an adapter is a compile-time failure, and a
//! misconfigured one fails at startup instead of at call time.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::{CrosscastError, Result};
use crate::platforms::{
    facebook::FacebookConnector, instagram::InstagramConnector, linkedin::LinkedinConnector,
    tiktok::TiktokConnector, twitter::TwitterConnector, youtube::YoutubeConnector, Connector,
};
use crate::types::Platform;

pub struct ConnectorRegistry {
    connectors: HashMap<Platform, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Build adapters for every platform from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.sync.request_timeout()?;
        let mut connectors: HashMap<Platform, Arc<dyn Connector>> = HashMap::new();

        for platform in Platform::ALL {
            let app = config.platforms.get(&platform).cloned();
            let connector: Arc<dyn Connector> = match platform {
                Platform::Twitter => Arc::new(TwitterConnector::new(app, timeout)?),
                Platform::Instagram => Arc::new(InstagramConnector::new(app, timeout)?),
                Platform::Linkedin => Arc::new(LinkedinConnector::new(app, timeout)?),
                Platform::Facebook => Arc::new(FacebookConnector::new(app, timeout)?),
                Platform::Youtube => Arc::new(YoutubeConnector::new(app, timeout)?),
                Platform::Tiktok => Arc::new(TiktokConnector::new(app, timeout)?),
            };
            connectors.insert(platform, connector);
        }

        info!("Registered {} platform connectors", connectors.len());
        Ok(Self { connectors })
    }

    /// Build a registry from explicit connectors. Platforms not covered
    /// are absent and resolve to an error. Intended for tests.
    pub fn with_connectors(connectors: Vec<Arc<dyn Connector>>) -> Self {
        let connectors = connectors
            .into_iter()
            .map(|c| (c.platform(), c))
            .collect();
        Self { connectors }
    }

    /// Resolve the adapter for a platform.
    pub fn get(&self, platform: Platform) -> Result<Arc<dyn Connector>> {
        self.connectors.get(&platform).cloned().ok_or_else(|| {
            CrosscastError::InvalidInput(format!(
                "No connector registered for platform '{}'",
                platform
            ))
        })
    }
}
