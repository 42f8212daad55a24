//! Metadata error types.

use thiserror::Error;

/// Result type alias for metadata formatting.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while formatting option metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("option has neither a short nor a long description: {0}")]
    MissingDescription(String),
}
