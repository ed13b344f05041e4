//! Encoded still images produced by the capture controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::TypesError;

/// MIME descriptor of an encoded still image.
///
/// The verification service only accepts JPEG and PNG uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageMime {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
        }
    }

    /// Parse a MIME string such as `image/jpeg`.
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(ImageMime::Jpeg),
            "image/png" => Ok(ImageMime::Png),
            other => Err(TypesError::UnsupportedMime(other.to_string())),
        }
    }

    /// Conventional file extension, used for multipart filenames.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "jpg",
            ImageMime::Png => "png",
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable encoded image plus its MIME descriptor.
///
/// Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct StillImage {
    bytes: Arc<[u8]>,
    mime: ImageMime,
}

impl StillImage {
    pub fn new(bytes: impl Into<Vec<u8>>, mime: ImageMime) -> Result<Self, TypesError> {
        let bytes: Vec<u8> = bytes.into();
        if bytes.is_empty() {
            return Err(TypesError::EmptyImage);
        }
        Ok(Self {
            bytes: bytes.into(),
            mime,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for StillImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StillImage")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}
