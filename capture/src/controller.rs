//! Entry point for opening capture sessions.
//!
//! The camera is exclusively owned by at most one live session: opening a
//! new session first closes the previous one, and acquisitions are
//! serialized so two devices are never requested at once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::device::DeviceHandle;
use crate::error::CaptureError;
use crate::media::{Facing, FrameEncoder, MediaCapability};
use crate::session::{CaptureSession, CaptureStatus, Shared};
use crate::DEFAULT_COUNTDOWN_MS;

/// How a session should be opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    #[serde(default)]
    pub facing: Facing,
    #[serde(default = "default_auto_capture")]
    pub auto_capture: bool,
    #[serde(default = "default_countdown_ms")]
    pub countdown_ms: u64,
}

fn default_auto_capture() -> bool {
    true
}

fn default_countdown_ms() -> u64 {
    DEFAULT_COUNTDOWN_MS
}

impl CaptureOptions {
    /// Timed auto-capture with the given countdown.
    pub fn auto(facing: Facing, countdown_ms: u64) -> Self {
        Self {
            facing,
            auto_capture: true,
            countdown_ms,
        }
    }

    /// Preview only; stills are taken with `capture_now`.
    pub fn manual(facing: Facing) -> Self {
        Self {
            facing,
            auto_capture: false,
            countdown_ms: DEFAULT_COUNTDOWN_MS,
        }
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::auto(Facing::User, DEFAULT_COUNTDOWN_MS)
    }
}

pub struct CaptureController {
    media: Arc<dyn MediaCapability>,
    encoder: Arc<dyn FrameEncoder>,
    live: Mutex<Option<Weak<Shared>>>,
    acquiring: tokio::sync::Mutex<()>,
    requesting: AtomicBool,
    next_id: AtomicU64,
}

/// Marks a device request as pending until dropped.
struct PendingRequest<'a>(&'a AtomicBool);

impl<'a> PendingRequest<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CaptureController {
    pub fn new(media: Arc<dyn MediaCapability>, encoder: Arc<dyn FrameEncoder>) -> Self {
        Self {
            media,
            encoder,
            live: Mutex::new(None),
            acquiring: tokio::sync::Mutex::new(()),
            requesting: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Acquire the camera and start a session.
    ///
    /// Any session still holding the device is closed first. Fails with
    /// [`CaptureError::DeviceUnavailable`] when the platform refuses the
    /// device, or [`CaptureError::Cancelled`] if `cancel` fires while the
    /// request is pending.
    pub async fn open(
        &self,
        options: CaptureOptions,
        cancel: &CancelToken,
    ) -> Result<CaptureSession, CaptureError> {
        let _acquiring = self.acquiring.lock().await;
        self.close_live();

        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session = id, facing = %options.facing, "requesting capture device");

        let pending = PendingRequest::start(&self.requesting);
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(session = id, "device request cancelled");
                return Err(CaptureError::Cancelled);
            }
            acquired = self.media.acquire(options.facing) => acquired.map_err(|e| {
                tracing::warn!(session = id, error = %e, "capture device unavailable");
                CaptureError::DeviceUnavailable(e.0)
            })?,
        };
        drop(pending);

        let session = CaptureSession::start(
            id,
            DeviceHandle::new(stream, options.facing),
            self.encoder.clone(),
            options.auto_capture,
            options.countdown(),
        );

        *self.live.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::downgrade(session.shared()));
        Ok(session)
    }

    /// Status of the device slot: `Idle` when no session is alive,
    /// `Requesting` while a device request is pending, otherwise the live
    /// session's status.
    pub fn status(&self) -> CaptureStatus {
        if self.requesting.load(Ordering::SeqCst) {
            return CaptureStatus::Requesting;
        }
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
            .map_or(CaptureStatus::Idle, |shared| shared.status())
    }

    /// Close whichever session currently holds the device.
    /// Returns `true` if one was still alive.
    pub fn close_live(&self) -> bool {
        let previous = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .and_then(|weak| weak.upgrade());
        match previous {
            Some(shared) => {
                shared.close();
                true
            }
            None => false,
        }
    }
}
