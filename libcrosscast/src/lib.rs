//! Crosscast - social platform connector layer
//!
//! Unifies several independent, inconsistent social-media APIs behind
//! one interface: credential lifecycle management, per-connection quota
//! tracking, payload normalization into a canonical model, incremental
//! sync, and fan-out publishing with per-target failure reporting.

pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod platforms;
pub mod publish;
pub mod quota;
pub mod service;
pub mod store;
pub mod sync;
pub mod tokens;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{CrosscastError, PlatformError, Result};
pub use platforms::{Connector, ConnectorRegistry};
pub use service::ConnectorService;
pub use store::{MemoryStore, SqliteStore, Store};
pub use types::{
    ConnectionStatus, Metrics, MetricsSnapshot, Platform, PostDraft, Profile, PublishReport,
    SocialConnection, SocialPost,
};
