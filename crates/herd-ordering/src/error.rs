//! Ordering error types.

use thiserror::Error;

/// Result type alias for ordering operations.
pub type OrderingResult<T> = Result<T, OrderingError>;

/// Errors raised at the ordering API boundary. A missing child action
/// during interleaving is logged and skipped, not raised.
#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("working set error: {0}")]
    Core(#[from] herd_core::CoreError),

    #[error("notification builder failed: {0}")]
    Notification(String),
}
