//! Exclusive owner of an acquired camera stream.

use crate::media::{Facing, Frame, MediaError, MediaStream};

/// The acquired device. Stopped exactly once: by [`DeviceHandle::release`]
/// or, failing that, when dropped.
pub struct DeviceHandle {
    stream: Option<Box<dyn MediaStream>>,
    facing: Facing,
}

impl DeviceHandle {
    pub fn new(stream: Box<dyn MediaStream>, facing: Facing) -> Self {
        Self {
            stream: Some(stream),
            facing,
        }
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    pub fn is_ready(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_ready())
    }

    pub fn current_frame(&mut self) -> Result<Frame, MediaError> {
        match self.stream.as_mut() {
            Some(stream) => stream.current_frame(),
            None => Err(MediaError("device already released".into())),
        }
    }

    /// Stop the stream. Returns `false` if it was already stopped.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                tracing::debug!(facing = %self.facing, "capture device released");
                true
            }
            None => false,
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("facing", &self.facing)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStream(Arc<AtomicUsize>);

    impl MediaStream for CountingStream {
        fn is_ready(&self) -> bool {
            true
        }
        fn current_frame(&mut self) -> Result<Frame, MediaError> {
            Ok(Frame {
                width: 1,
                height: 1,
                rgba: vec![0; 4],
            })
        }
        fn stop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn release_stops_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut handle = DeviceHandle::new(Box::new(CountingStream(stops.clone())), Facing::User);
        assert!(handle.release());
        assert!(!handle.release());
        drop(handle);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_unreleased_handle() {
        let stops = Arc::new(AtomicUsize::new(0));
        let handle = DeviceHandle::new(Box::new(CountingStream(stops.clone())), Facing::User);
        drop(handle);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_handle_has_no_frames() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut handle = DeviceHandle::new(Box::new(CountingStream(stops)), Facing::Environment);
        handle.release();
        assert!(handle.current_frame().is_err());
        assert!(!handle.is_ready());
    }
}
