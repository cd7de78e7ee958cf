//! Error types for the Hearth agent runtime

use thiserror::Error;

/// Result type alias for Hearth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Hearth agent runtime
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Identity string matched neither the wallet-address nor the
    /// agent-identifier grammar
    #[error("invalid identity format: {0}")]
    InvalidIdentity(String),

    /// Channel string was malformed (wrong segment count, unknown
    /// discriminator, bad segment)
    #[error("invalid channel format: {0}")]
    InvalidChannel(String),

    /// Inbound payload failed message validation
    #[error("message validation failed: {0}")]
    Validation(String),

    /// Response generation failed
    #[error("generation failed: {0}")]
    Generation(String),

    /// Embedding error
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Transport send error
    #[error("transport error: {0}")]
    Transport(String),

    /// Hook dispatch error
    #[error("hook error: {0}")]
    Hook(String),

    /// Action registration or execution error
    #[error("action error: {0}")]
    Action(String),

    /// Inbound event could not be queued for its channel
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Signed admin command rejected
    #[error("security error: {0}")]
    Security(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
