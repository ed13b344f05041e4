use thiserror::Error;

/// Errors constructing a client. Per-call failures are reported through
/// [`Outcome`](crate::Outcome) instead.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid backend URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to create HTTP client: {0}")]
    Build(String),
}
