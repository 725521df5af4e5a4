//! Fatal migration errors.
//!
//! Row-level problems never appear here; they are [`crate::RowOutcome`]
//! values collected into the phase report.

use thiserror::Error;
use threatsync_db::DbError;
use threatsync_graph::GraphError;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Source or destination cannot be reached or used. Aborts the run.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Invalid migration configuration: {0}")]
    Config(String),
}

/// Result type for migration operations.
pub type EtlResult<T> = Result<T, EtlError>;

impl From<GraphError> for EtlError {
    fn from(err: GraphError) -> Self {
        Self::Connectivity(err.to_string())
    }
}

impl From<DbError> for EtlError {
    fn from(err: DbError) -> Self {
        Self::Connectivity(err.to_string())
    }
}
