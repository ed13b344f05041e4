//! Platform capabilities consumed by the controller.
//!
//! The camera and the drawing surface are injected rather than reached
//! through globals, so the controller can run against fakes.

use async_trait::async_trait;
use idgate_types::ImageMime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which camera to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front camera (selfies, face authentication).
    #[default]
    User,
    /// Rear camera (documents).
    Environment,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::User => f.write_str("user"),
            Facing::Environment => f.write_str("environment"),
        }
    }
}

/// Platform failure text. Never parsed for control flow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MediaError(pub String);

/// One raw video frame, as drawn onto the capture surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA pixels.
    pub rgba: Vec<u8>,
}

/// Grants access to a camera.
#[async_trait]
pub trait MediaCapability: Send + Sync {
    /// Request a live video stream.
    ///
    /// If the returned future is dropped before completion the
    /// implementation must not leave the device acquired.
    async fn acquire(&self, facing: Facing) -> Result<Box<dyn MediaStream>, MediaError>;
}

/// A live platform stream. Exclusively owned by one [`DeviceHandle`].
///
/// [`DeviceHandle`]: crate::DeviceHandle
pub trait MediaStream: Send {
    /// Whether frames are flowing yet (the preview has started playing).
    fn is_ready(&self) -> bool;

    /// Draw the current frame.
    fn current_frame(&mut self) -> Result<Frame, MediaError>;

    /// Stop every track, turning the device indicator off.
    fn stop(&mut self);
}

/// 2D drawing surface that encodes a frame to an image format.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame, mime: ImageMime, quality: f32)
        -> Result<Vec<u8>, MediaError>;
}
