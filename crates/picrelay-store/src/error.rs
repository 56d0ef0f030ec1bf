use thiserror::Error;

/// Store operation errors. Platform errors (permission denied, disk full,
/// directory creation) are always wrapped with the operation and key they
/// occurred on, never surfaced raw.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to initialize store at {path}: {source}")]
    Init {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read key '{key}': {message}")]
    Read { key: String, message: String },

    #[error("Failed to write key '{key}': {message}")]
    Write { key: String, message: String },

    #[error("Failed to clear store: {message}")]
    Clear { message: String },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
