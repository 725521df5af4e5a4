//! Graph adapter errors.
//!
//! Every variant is fatal to a migration run: there is no partial-read
//! recovery at this layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid graph configuration: {0}")]
    Config(String),

    #[error("Graph connection failed: {0}")]
    Connection(String),

    #[error("Graph query failed: {0}")]
    Query(String),

    #[error("Graph snapshot error: {0}")]
    Snapshot(String),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
