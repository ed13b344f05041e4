//! Top-level error type shared across crates.

use thiserror::Error;

/// Errors raised while constructing the shared value types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("wallet address must not be empty")]
    EmptyAddress,

    #[error("content address must not be empty")]
    EmptyContentAddress,

    #[error("document type must not be empty")]
    EmptyDocumentType,

    #[error("still image has no data")]
    EmptyImage,

    #[error("unsupported image MIME type: {0}")]
    UnsupportedMime(String),
}
