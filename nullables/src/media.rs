//! Nullable camera: hands out fake streams and counts device releases.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use idgate_capture::{Facing, Frame, FrameEncoder, MediaCapability, MediaError, MediaStream};
use idgate_types::ImageMime;

#[derive(Default)]
struct Counters {
    acquired: AtomicUsize,
    stopped: AtomicUsize,
    not_ready: AtomicBool,
}

/// A test camera.
#[derive(Default)]
pub struct NullMedia {
    counters: Arc<Counters>,
    deny: Mutex<Option<String>>,
    facings: Mutex<Vec<Facing>>,
}

impl NullMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// A camera whose every acquisition fails with `message`.
    pub fn denying(message: impl Into<String>) -> Self {
        let media = Self::default();
        media.deny(Some(message.into()));
        media
    }

    /// Fail (`Some`) or allow (`None`) subsequent acquisitions.
    pub fn deny(&self, message: Option<String>) {
        *self.deny.lock().unwrap_or_else(PoisonError::into_inner) = message;
    }

    /// Make streams report not-ready (no frames yet).
    pub fn set_ready(&self, ready: bool) {
        self.counters.not_ready.store(!ready, Ordering::SeqCst);
    }

    /// Streams handed out so far.
    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    /// Streams stopped so far.
    pub fn stopped(&self) -> usize {
        self.counters.stopped.load(Ordering::SeqCst)
    }

    /// Streams acquired and not yet stopped (device indicator on).
    pub fn live(&self) -> usize {
        self.acquired().saturating_sub(self.stopped())
    }

    pub fn facings(&self) -> Vec<Facing> {
        self.facings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MediaCapability for NullMedia {
    async fn acquire(&self, facing: Facing) -> Result<Box<dyn MediaStream>, MediaError> {
        if let Some(message) = self
            .deny
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(MediaError(message));
        }
        self.facings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(facing);
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NullStream {
            counters: self.counters.clone(),
            stopped: false,
            frame_no: 0,
        }))
    }
}

struct NullStream {
    counters: Arc<Counters>,
    stopped: bool,
    frame_no: u8,
}

impl MediaStream for NullStream {
    fn is_ready(&self) -> bool {
        !self.stopped && !self.counters.not_ready.load(Ordering::SeqCst)
    }

    fn current_frame(&mut self) -> Result<Frame, MediaError> {
        if !self.is_ready() {
            return Err(MediaError("no frame available".into()));
        }
        self.frame_no = self.frame_no.wrapping_add(1);
        Ok(Frame {
            width: 2,
            height: 1,
            rgba: vec![self.frame_no, 0, 0, 255, 0, self.frame_no, 0, 255],
        })
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Encoder that prefixes the raw pixels with a JPEG start-of-image marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEncoder;

impl FrameEncoder for NullEncoder {
    fn encode(&self, frame: &Frame, mime: ImageMime, _quality: f32) -> Result<Vec<u8>, MediaError> {
        let mut out = match mime {
            ImageMime::Jpeg => vec![0xff, 0xd8],
            ImageMime::Png => vec![0x89, b'P', b'N', b'G'],
        };
        out.extend_from_slice(&frame.rgba);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_acquire_and_stop() {
        let media = NullMedia::new();
        let mut stream = media.acquire(Facing::User).await.unwrap();
        assert_eq!(media.live(), 1);
        assert!(stream.current_frame().is_ok());
        stream.stop();
        stream.stop();
        assert_eq!(media.stopped(), 1);
        assert_eq!(media.live(), 0);
    }

    #[tokio::test]
    async fn denial_carries_platform_message() {
        let media = NullMedia::denying("NotAllowedError: Permission denied");
        let err = media.acquire(Facing::User).await.err().unwrap();
        assert_eq!(err.0, "NotAllowedError: Permission denied");
        assert_eq!(media.acquired(), 0);
    }

    #[test]
    fn encoder_marks_jpeg() {
        let frame = Frame {
            width: 1,
            height: 1,
            rgba: vec![1, 2, 3, 4],
        };
        let bytes = NullEncoder.encode(&frame, ImageMime::Jpeg, 0.92).unwrap();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    }
}
