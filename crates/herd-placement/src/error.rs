//! Placement error types.

use thiserror::Error;

/// Result type alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors raised at the placement API boundary. An instance that simply
/// cannot be placed is not an error; it is left provisional and pinned.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("max_per_node must be at least 1")]
    InvalidPerNodeCap,

    #[error("resource is not a clone or bundle: {0}")]
    NotCollective(String),

    #[error("working set error: {0}")]
    Core(#[from] herd_core::CoreError),
}
