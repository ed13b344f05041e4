//! Capture device controller.
//!
//! Owns the camera resource for one capture at a time:
//! 1. **Acquire** a live stream through an injected [`MediaCapability`].
//! 2. **Capture** a still frame, on demand or after a timed countdown.
//! 3. **Release** the device exactly once, whatever the exit path.
//!
//! The controller has no knowledge of identity or authentication; it only
//! turns a platform stream plus a [`FrameEncoder`] into a [`StillImage`].
//!
//! [`StillImage`]: idgate_types::StillImage

pub mod cancel;
pub mod controller;
pub mod device;
pub mod error;
pub mod media;
pub mod session;

pub use cancel::CancelToken;
pub use controller::{CaptureController, CaptureOptions};
pub use device::DeviceHandle;
pub use error::CaptureError;
pub use media::{Facing, Frame, FrameEncoder, MediaCapability, MediaError, MediaStream};
pub use session::{CaptureSession, CaptureStatus};

/// Default auto-capture countdown.
pub const DEFAULT_COUNTDOWN_MS: u64 = 3000;

/// Encoding quality used for every still capture.
pub const JPEG_QUALITY: f32 = 0.92;
