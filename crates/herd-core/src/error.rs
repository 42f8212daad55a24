//! Error types for the working-set model.

use thiserror::Error;

/// Result type alias for working-set operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised at the working-set API boundary. These indicate caller
/// bugs (dangling indices), not scheduling outcomes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("resource index out of range: {0}")]
    UnknownResource(usize),

    #[error("action index out of range: {0}")]
    UnknownAction(usize),

    #[error("colocation index out of range: {0}")]
    UnknownColocation(usize),

    #[error("node not in working set: {0}")]
    UnknownNode(String),
}
