//! Error types for Crosscast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error (for the binaries)
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::InvalidInput(_) => 3,
            CrosscastError::Platform(PlatformError::AuthExpired(_))
            | CrosscastError::Platform(PlatformError::Revoked(_)) => 2,
            CrosscastError::Platform(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Database(_) => 1,
            CrosscastError::NotFound(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Outcome taxonomy for calls against external platforms.
///
/// Every adapter maps its platform's raw failures into exactly one of
/// these variants; everything downstream (token manager, quota tracker,
/// orchestrator, publisher) branches on the variant, never on message
/// text.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    /// Token rejected by the platform. May self-heal via refresh.
    #[error("Auth expired: {0}")]
    AuthExpired(String),

    /// Call budget exhausted. Retry after the reset window.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network failure, timeout, or 5xx. Retry with backoff.
    #[error("Transient platform failure: {0}")]
    Transient(String),

    /// 4xx business-rule rejection (duplicate content, unsupported
    /// operation). Never retried.
    #[error("Platform rejected request: {0}")]
    PlatformRejected(String),

    /// Malformed local input. Never sent upstream.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Refresh itself failed with a permanent grant error. Requires
    /// user re-authentication.
    #[error("Connection revoked: {0}")]
    Revoked(String),
}

impl PlatformError {
    /// Whether a retry (now or on the next cycle) can plausibly succeed
    /// without human intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Transient(_) | PlatformError::RateLimited(_)
        )
    }

    /// Whether this error means the stored token is no longer usable at
    /// all and the user must re-authenticate.
    pub fn is_permanent_auth_failure(&self) -> bool {
        matches!(self, PlatformError::Revoked(_))
    }
}
