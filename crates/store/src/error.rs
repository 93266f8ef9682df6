//! Store error types

/// Errors that can occur while reading channel documents or smart properties
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store reachable but the channel source is down
    #[error("connection failed: {0}")]
    Connection(String),

    /// Requested project or channel does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored document could not be decoded
    #[error("malformed document: {0}")]
    Malformed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<glob::PatternError> for StoreError {
    fn from(err: glob::PatternError) -> Self {
        StoreError::Config(format!("invalid glob pattern: {}", err))
    }
}

impl From<glob::GlobError> for StoreError {
    fn from(err: glob::GlobError) -> Self {
        StoreError::Io(std::io::Error::other(err.to_string()))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}
