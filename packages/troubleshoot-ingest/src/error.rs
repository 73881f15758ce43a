//! Typed errors for the ingest library.
//!
//! Library code returns these `thiserror` enums; only the binary converts to
//! `anyhow`. Per-item failures inside a run never surface here: they are
//! recorded as [`crate::types::report::ItemOutcome::Failed`] instead.

use thiserror::Error;

/// Top-level error for pipeline operations.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Text-classification service failed
    #[error("classification error: {0}")]
    Classification(String),

    /// Embedding service failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A hosted service was unreachable, rate limited, or erroring; retrying
    /// later may succeed
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Relational store operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Vector index operation failed
    #[error("vector index error: {0}")]
    VectorIndex(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Errors that stop the whole process instead of one target: bad
    /// configuration, missing credentials, and store failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Config(_)
                | IngestError::Auth(AuthError::MissingCredentials { .. })
                | IngestError::Storage(_)
                | IngestError::VectorIndex(_)
        )
    }
}

/// Errors fetching a single page. Never fatal to a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    #[error("robots.txt disallows: {url}")]
    RobotsDisallowed { url: String },

    #[error("session expired, redirected to login: {url}")]
    SessionExpired { url: String },
}

/// Errors authenticating against a target site.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Fatal: raised before any network activity.
    #[error("missing credentials for target '{target}': {var} not set")]
    MissingCredentials { target: String, var: String },

    #[error("login form not found at {url}")]
    FormNotFound { url: String },

    /// All submission strategies ended on a login location.
    #[error("login rejected for {url} after {attempts} strategies")]
    LoginRejected { url: String, attempts: usize },

    #[error("login request failed: {0}")]
    Request(#[from] FetchError),

    #[error("session file error: {0}")]
    Session(String),
}

/// Configuration errors. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid target file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("vector index '{name}' has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        name: String,
        actual: u32,
        expected: u32,
    },
}

impl From<pinecone_client::PineconeError> for IngestError {
    fn from(e: pinecone_client::PineconeError) -> Self {
        IngestError::VectorIndex(Box::new(e))
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Storage(Box::new(e))
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for page fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for authentication.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_failures_are_not_fatal() {
        let unreachable = IngestError::Auth(AuthError::Request(FetchError::Timeout {
            url: "http://dealer.example.com/LogonForm".into(),
        }));
        let rejected = IngestError::Auth(AuthError::LoginRejected {
            url: "http://dealer.example.com/LogonForm".into(),
            attempts: 2,
        });
        let page = IngestError::Fetch(FetchError::Status {
            url: "http://dealer.example.com/files".into(),
            status: 503,
        });

        assert!(!unreachable.is_fatal());
        assert!(!rejected.is_fatal());
        assert!(!page.is_fatal());
        assert!(!IngestError::ServiceUnavailable("429".into()).is_fatal());
    }

    #[test]
    fn test_config_and_credentials_are_fatal() {
        let missing = IngestError::Auth(AuthError::MissingCredentials {
            target: "snapone-dealer".into(),
            var: "SNAPONE_USERNAME".into(),
        });
        let config = IngestError::Config(ConfigError::MissingVar("OPENAI_API_KEY".into()));
        let storage = IngestError::Storage("connection refused".into());

        assert!(missing.is_fatal());
        assert!(config.is_fatal());
        assert!(storage.is_fatal());
    }
}
