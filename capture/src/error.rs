use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The camera could not be acquired (permission denied, no device, busy).
    /// The text is the platform's message and is diagnostic only.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture requested before the stream was ready")]
    NotStreaming,

    #[error("capture session was released")]
    Released,

    #[error("capture was cancelled")]
    Cancelled,

    #[error("frame could not be encoded: {0}")]
    Encode(String),
}
