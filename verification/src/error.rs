use idgate_capture::CaptureError;
use idgate_wallet_core::WalletError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failure, as carried by [`FlowState::Failed`](crate::FlowState::Failed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DeviceUnavailable,
    NotStreaming,
    TransportFailure,
    Rejected,
    InvalidState,
    Wallet,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SessionError {
    /// The camera could not be acquired. Retry by opening again.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture requested before the stream was ready")]
    NotStreaming,

    /// The service could not be reached or answered garbage. The same call
    /// may be re-issued.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The service said no. New input is needed before retrying.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The operation is not allowed in the current state. A caller bug.
    #[error("{operation} is not allowed in state {state}")]
    InvalidState { operation: &'static str, state: String },

    /// Another operation is still in flight for this identity.
    #[error("{operation} refused: {in_flight} is still in flight")]
    Busy {
        operation: &'static str,
        in_flight: &'static str,
    },

    /// The operation was cancelled, or superseded by a rebind, before its
    /// result could be applied.
    #[error("operation cancelled")]
    Cancelled,

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            SessionError::NotStreaming => ErrorKind::NotStreaming,
            SessionError::TransportFailure(_) | SessionError::Cancelled => {
                ErrorKind::TransportFailure
            }
            SessionError::Rejected(_) => ErrorKind::Rejected,
            SessionError::InvalidState { .. } | SessionError::Busy { .. } => {
                ErrorKind::InvalidState
            }
            SessionError::Wallet(_) => ErrorKind::Wallet,
        }
    }

    /// Whether re-issuing the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::TransportFailure(_) | SessionError::DeviceUnavailable(_)
        )
    }
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::DeviceUnavailable(msg) => SessionError::DeviceUnavailable(msg),
            CaptureError::NotStreaming => SessionError::NotStreaming,
            CaptureError::Cancelled | CaptureError::Released => SessionError::Cancelled,
            CaptureError::Encode(msg) => {
                SessionError::DeviceUnavailable(format!("frame could not be encoded: {msg}"))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
