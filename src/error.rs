//! Error types for the fleet orchestrator

use thiserror::Error;

/// Result type alias for fleet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the fleet orchestrator
///
/// Per-node failures during a cluster operation are never reported through
/// this type; they travel as data inside an aggregate result. Only caller
/// mistakes and local infrastructure failures surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The resolved target set was empty, nothing was dispatched
    #[error("no target nodes")]
    NoTargets,

    /// The engine was shut down; nothing was dispatched
    #[error("shutting down")]
    ShuttingDown,

    /// An explicitly named node does not exist in the directory
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Node with the same name already exists
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// Invalid input supplied by the caller
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
