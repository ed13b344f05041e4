//! One camera lifecycle: stream, optional countdown, still capture, release.
//!
//! The countdown display tick and the capture trigger are two independent
//! tasks sharing one cancellation token. Only the trigger changes the
//! session's phase; the tick merely refreshes `seconds_remaining` while the
//! session is still counting down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use idgate_types::{ImageMime, StillImage};
use idgate_utils::format_countdown;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cancel::CancelToken;
use crate::device::DeviceHandle;
use crate::error::CaptureError;
use crate::media::FrameEncoder;
use crate::JPEG_QUALITY;

/// How often a starting preview is checked for frames.
const READY_POLL: Duration = Duration::from_millis(50);

/// Observable status of a capture session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureStatus {
    /// No session holds the device.
    Idle,
    /// A device request is pending.
    Requesting,
    Streaming,
    Countdown { seconds_remaining: u32 },
    Capturing,
    Captured,
    Released,
    Failed(String),
}

impl CaptureStatus {
    /// `Released` and `Failed` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureStatus::Released | CaptureStatus::Failed(_))
    }

    /// States in which a still may be taken.
    pub fn accepts_capture(&self) -> bool {
        matches!(
            self,
            CaptureStatus::Streaming | CaptureStatus::Countdown { .. }
        )
    }
}

struct Inner {
    status: CaptureStatus,
    device: Option<DeviceHandle>,
    image: Option<StillImage>,
    failure: Option<CaptureError>,
}

pub(crate) struct Shared {
    id: u64,
    inner: Mutex<Inner>,
    status_tx: watch::Sender<CaptureStatus>,
    encoder: Arc<dyn FrameEncoder>,
    timers: CancelToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> CaptureStatus {
        self.lock().status.clone()
    }

    fn set_status(&self, inner: &mut Inner, status: CaptureStatus) {
        tracing::debug!(session = self.id, from = ?inner.status, to = ?status, "capture status");
        inner.status = status.clone();
        self.status_tx.send_replace(status);
    }

    fn release_device(&self, inner: &mut Inner) -> bool {
        match inner.device.take() {
            Some(mut device) => device.release(),
            None => false,
        }
    }

    /// Take a still from the live stream.
    ///
    /// `trigger` is the countdown token when called by the auto-capture
    /// trigger; a cancelled trigger never captures.
    fn capture(
        &self,
        release_after: bool,
        trigger: Option<&CancelToken>,
    ) -> Result<StillImage, CaptureError> {
        let mut inner = self.lock();

        if let Some(token) = trigger {
            if token.is_cancelled()
                || !matches!(inner.status, CaptureStatus::Countdown { .. })
            {
                return Err(CaptureError::Cancelled);
            }
        }
        if !inner.status.accepts_capture() {
            return Err(CaptureError::NotStreaming);
        }
        if !inner.device.as_ref().is_some_and(DeviceHandle::is_ready) {
            return Err(CaptureError::NotStreaming);
        }

        // A still taken by hand during the countdown supersedes the trigger.
        self.timers.cancel();
        self.set_status(&mut inner, CaptureStatus::Capturing);

        let encoded = match inner.device.as_mut() {
            Some(device) => device
                .current_frame()
                .and_then(|frame| self.encoder.encode(&frame, ImageMime::Jpeg, JPEG_QUALITY))
                .map_err(|e| CaptureError::Encode(e.0))
                .and_then(|bytes| {
                    StillImage::new(bytes, ImageMime::Jpeg)
                        .map_err(|e| CaptureError::Encode(e.to_string()))
                }),
            None => Err(CaptureError::NotStreaming),
        };

        match encoded {
            Ok(image) => {
                inner.image = Some(image.clone());
                if release_after {
                    self.release_device(&mut inner);
                }
                self.set_status(&mut inner, CaptureStatus::Captured);
                tracing::info!(session = self.id, bytes = image.len(), "still image captured");
                Ok(image)
            }
            Err(e) => {
                self.fail_locked(&mut inner, e.clone());
                Err(e)
            }
        }
    }

    fn fail_locked(&self, inner: &mut Inner, error: CaptureError) {
        self.timers.cancel();
        self.release_device(inner);
        inner.image = None;
        tracing::warn!(session = self.id, error = %error, "capture session failed");
        self.set_status(inner, CaptureStatus::Failed(error.to_string()));
        inner.failure = Some(error);
    }

    fn tick(&self, seconds_remaining: u32) {
        let mut inner = self.lock();
        if matches!(inner.status, CaptureStatus::Countdown { .. }) {
            inner.status = CaptureStatus::Countdown { seconds_remaining };
            self.status_tx.send_replace(inner.status.clone());
        }
    }

    /// Move to `Released` from any non-terminal state.
    fn cancel(&self) {
        self.timers.cancel();
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return;
        }
        self.release_device(&mut inner);
        inner.image = None;
        self.set_status(&mut inner, CaptureStatus::Released);
    }

    /// Release the device; a captured image stays readable.
    pub(crate) fn close(&self) {
        self.timers.cancel();
        let mut inner = self.lock();
        let released = self.release_device(&mut inner);
        match inner.status {
            CaptureStatus::Captured | CaptureStatus::Released | CaptureStatus::Failed(_) => {}
            _ => self.set_status(&mut inner, CaptureStatus::Released),
        }
        if released {
            tracing::debug!(session = self.id, "capture session closed");
        }
    }
}

/// A live capture session. Dropping it releases the device.
pub struct CaptureSession {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl CaptureSession {
    pub(crate) fn start(
        id: u64,
        device: DeviceHandle,
        encoder: Arc<dyn FrameEncoder>,
        auto_capture: bool,
        countdown: Duration,
    ) -> Self {
        let initial = if auto_capture {
            CaptureStatus::Countdown {
                seconds_remaining: format_countdown(duration_ms(countdown)),
            }
        } else {
            CaptureStatus::Streaming
        };
        let (status_tx, _rx) = watch::channel(initial.clone());
        let shared = Arc::new(Shared {
            id,
            inner: Mutex::new(Inner {
                status: initial,
                device: Some(device),
                image: None,
                failure: None,
            }),
            status_tx,
            encoder,
            timers: CancelToken::new(),
        });

        let mut tasks = Vec::new();
        if auto_capture {
            let started = Instant::now();
            tasks.push(tokio::spawn(run_countdown_ticks(
                shared.clone(),
                started,
                countdown,
            )));
            tasks.push(tokio::spawn(run_capture_trigger(
                shared.clone(),
                started + countdown,
            )));
        }

        Self { shared, tasks }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn status(&self) -> CaptureStatus {
        self.shared.status()
    }

    /// Watch status changes (countdown display, capture completion).
    pub fn subscribe(&self) -> watch::Receiver<CaptureStatus> {
        self.shared.status_tx.subscribe()
    }

    /// The captured still, present only in `Captured`.
    pub fn image(&self) -> Option<StillImage> {
        self.shared.lock().image.clone()
    }

    pub fn holds_device(&self) -> bool {
        self.shared.lock().device.is_some()
    }

    /// Resolve once the preview delivers frames. Fails if the session ends
    /// first.
    pub async fn stream_ready(&self) -> Result<(), CaptureError> {
        let mut poll = tokio::time::interval(READY_POLL);
        loop {
            poll.tick().await;
            let inner = self.shared.lock();
            match &inner.status {
                CaptureStatus::Released => return Err(CaptureError::Cancelled),
                CaptureStatus::Failed(_) => {
                    return Err(inner.failure.clone().unwrap_or(CaptureError::Released))
                }
                _ => {}
            }
            match inner.device.as_ref() {
                Some(device) if device.is_ready() => return Ok(()),
                Some(_) => {}
                None => return Err(CaptureError::Released),
            }
        }
    }

    /// Take a still right now. Cancels a running countdown; the device
    /// stays open until [`close`](Self::close).
    pub fn capture_now(&self) -> Result<StillImage, CaptureError> {
        self.shared.capture(false, None)
    }

    /// Wait for the session to produce a still (auto-capture, or a manual
    /// capture from another task).
    pub async fn wait_for_capture(&self) -> Result<StillImage, CaptureError> {
        let mut rx = self.subscribe();
        let done = rx
            .wait_for(|s| matches!(s, CaptureStatus::Captured) || s.is_terminal())
            .await
            .map(|s| s.clone());
        match done {
            Ok(CaptureStatus::Captured) => self.image().ok_or(CaptureError::Released),
            Ok(CaptureStatus::Failed(_)) => Err(self
                .shared
                .lock()
                .failure
                .clone()
                .unwrap_or(CaptureError::Released)),
            Ok(CaptureStatus::Released) => Err(CaptureError::Cancelled),
            _ => Err(CaptureError::Released),
        }
    }

    /// Discard the captured still and resume the preview. Only possible while
    /// the device is still held (manual capture).
    pub fn retake(&self) -> Result<(), CaptureError> {
        let mut inner = self.shared.lock();
        if inner.status != CaptureStatus::Captured {
            return Err(CaptureError::NotStreaming);
        }
        if inner.device.is_none() {
            return Err(CaptureError::Released);
        }
        inner.image = None;
        self.shared.set_status(&mut inner, CaptureStatus::Streaming);
        Ok(())
    }

    /// Abandon the session: stop timers, release the device, end in
    /// `Released`. Idempotent.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Release the device. Safe to call on every exit path, any number of
    /// times.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shared.close();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Refresh `seconds_remaining` once per second for display.
async fn run_countdown_ticks(shared: Arc<Shared>, start: Instant, countdown: Duration) {
    let deadline = start + countdown;
    let period = Duration::from_secs(1);
    let mut ticks = tokio::time::interval_at(start + period, period);
    loop {
        tokio::select! {
            biased;
            _ = shared.timers.cancelled() => return,
            _ = ticks.tick() => {}
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        let secs = format_countdown(duration_ms(remaining));
        shared.tick(secs);
        if secs == 0 {
            return;
        }
    }
}

/// Fire a single capture at the deadline, then release the device.
async fn run_capture_trigger(shared: Arc<Shared>, deadline: Instant) {
    tokio::select! {
        biased;
        _ = shared.timers.cancelled() => return,
        _ = tokio::time::sleep_until(deadline) => {}
    }
    let timers = shared.timers.clone();
    match shared.capture(true, Some(&timers)) {
        Ok(_) => {}
        Err(CaptureError::Cancelled) => {
            tracing::debug!(session = shared.id, "capture trigger suppressed");
        }
        Err(CaptureError::NotStreaming) => {
            let mut inner = shared.lock();
            shared.fail_locked(&mut inner, CaptureError::NotStreaming);
        }
        // Encoding failures already moved the session to `Failed`.
        Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Facing, Frame, MediaError, MediaStream};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        stops: AtomicUsize,
        frames: AtomicUsize,
        not_ready: AtomicBool,
    }

    struct ProbeStream(Arc<Probe>);

    impl MediaStream for ProbeStream {
        fn is_ready(&self) -> bool {
            !self.0.not_ready.load(Ordering::SeqCst)
        }
        fn current_frame(&mut self) -> Result<Frame, MediaError> {
            self.0.frames.fetch_add(1, Ordering::SeqCst);
            Ok(Frame {
                width: 2,
                height: 1,
                rgba: vec![7; 8],
            })
        }
        fn stop(&mut self) {
            self.0.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CopyEncoder;

    impl FrameEncoder for CopyEncoder {
        fn encode(
            &self,
            frame: &Frame,
            _mime: ImageMime,
            _quality: f32,
        ) -> Result<Vec<u8>, MediaError> {
            Ok(frame.rgba.clone())
        }
    }

    fn session(auto: bool, countdown_ms: u64) -> (CaptureSession, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let device = DeviceHandle::new(Box::new(ProbeStream(probe.clone())), Facing::User);
        let s = CaptureSession::start(
            1,
            device,
            Arc::new(CopyEncoder),
            auto,
            Duration::from_millis(countdown_ms),
        );
        (s, probe)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fires_once_at_deadline_and_releases() {
        let (s, probe) = session(true, 3000);
        assert_eq!(s.status(), CaptureStatus::Countdown { seconds_remaining: 3 });

        tokio::time::advance(Duration::from_millis(2999)).await;
        settle().await;
        assert!(matches!(s.status(), CaptureStatus::Countdown { .. }));
        assert_eq!(probe.frames.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        let image = s.wait_for_capture().await.unwrap();
        assert_eq!(image.mime(), ImageMime::Jpeg);
        assert_eq!(s.status(), CaptureStatus::Captured);
        assert_eq!(probe.frames.load(Ordering::SeqCst), 1);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);
        assert!(!s.holds_device());

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(probe.frames.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fires_exactly_once_for_any_countdown() {
        for countdown_ms in [0u64, 1, 250, 999, 1000, 1001, 1500, 2001, 3000, 4999] {
            let (s, probe) = session(true, countdown_ms);

            if countdown_ms > 0 {
                tokio::time::advance(Duration::from_millis(countdown_ms - 1)).await;
                settle().await;
                assert_eq!(
                    probe.frames.load(Ordering::SeqCst),
                    0,
                    "fired early for {countdown_ms}ms"
                );
                tokio::time::advance(Duration::from_millis(1)).await;
            }
            s.wait_for_capture().await.unwrap();
            assert_eq!(probe.stops.load(Ordering::SeqCst), 1);

            tokio::time::advance(Duration::from_millis(countdown_ms + 5000)).await;
            settle().await;
            assert_eq!(
                probe.frames.load(Ordering::SeqCst),
                1,
                "fired twice for {countdown_ms}ms"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_trigger_for_any_countdown() {
        for countdown_ms in [2u64, 999, 1000, 1501, 3000, 7250] {
            let (s, probe) = session(true, countdown_ms);
            tokio::time::advance(Duration::from_millis(countdown_ms / 2)).await;
            settle().await;
            s.cancel();

            tokio::time::advance(Duration::from_millis(countdown_ms * 2)).await;
            settle().await;
            assert_eq!(probe.frames.load(Ordering::SeqCst), 0, "{countdown_ms}ms");
            assert_eq!(probe.stops.load(Ordering::SeqCst), 1, "{countdown_ms}ms");
            assert_eq!(s.status(), CaptureStatus::Released);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_display_ticks_each_second() {
        let (s, _probe) = session(true, 3000);
        let rx = s.subscribe();

        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(*rx.borrow(), CaptureStatus::Countdown { seconds_remaining: 2 });

        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(*rx.borrow(), CaptureStatus::Countdown { seconds_remaining: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_deadline_suppresses_trigger() {
        let (s, probe) = session(true, 3000);
        tokio::time::advance(Duration::from_millis(1500)).await;
        settle().await;

        s.cancel();
        s.cancel();
        assert_eq!(s.status(), CaptureStatus::Released);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(probe.frames.load(Ordering::SeqCst), 0);
        assert_eq!(s.status(), CaptureStatus::Released);
        assert_eq!(s.wait_for_capture().await, Err(CaptureError::Cancelled));
    }

    #[tokio::test]
    async fn manual_capture_keeps_device_until_close() {
        let (s, probe) = session(false, 0);
        assert_eq!(s.status(), CaptureStatus::Streaming);

        let image = s.capture_now().unwrap();
        assert_eq!(image.bytes(), &[7; 8]);
        assert!(s.holds_device());
        assert_eq!(s.capture_now(), Err(CaptureError::NotStreaming));

        s.close();
        s.close();
        assert_eq!(s.status(), CaptureStatus::Captured);
        assert!(s.image().is_some());
        drop(s);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn capture_before_stream_ready_is_rejected() {
        let (s, probe) = session(false, 0);
        probe.not_ready.store(true, Ordering::SeqCst);
        assert_eq!(s.capture_now(), Err(CaptureError::NotStreaming));
        assert_eq!(s.status(), CaptureStatus::Streaming);

        probe.not_ready.store(false, Ordering::SeqCst);
        assert!(s.capture_now().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_ready_waits_for_first_frames() {
        let (s, probe) = session(false, 0);
        probe.not_ready.store(true, Ordering::SeqCst);

        let ready = s.stream_ready();
        tokio::pin!(ready);
        assert!(tokio::time::timeout(Duration::from_millis(500), &mut ready)
            .await
            .is_err());
        assert_eq!(s.status(), CaptureStatus::Streaming);

        probe.not_ready.store(false, Ordering::SeqCst);
        ready.await.unwrap();
        assert!(s.capture_now().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_ready_ends_with_session() {
        let (s, probe) = session(false, 0);
        probe.not_ready.store(true, Ordering::SeqCst);
        s.cancel();
        assert_eq!(s.stream_ready().await, Err(CaptureError::Cancelled));
    }

    #[tokio::test]
    async fn retake_resumes_preview() {
        let (s, _probe) = session(false, 0);
        s.capture_now().unwrap();
        s.retake().unwrap();
        assert_eq!(s.status(), CaptureStatus::Streaming);
        assert!(s.image().is_none());
        assert!(s.capture_now().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_mid_countdown_releases_and_stops_timers() {
        let (s, probe) = session(true, 3000);
        let rx = s.subscribe();
        drop(s);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(probe.frames.load(Ordering::SeqCst), 0);
        assert_eq!(*rx.borrow(), CaptureStatus::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_not_ready_at_deadline_fails_session() {
        let (s, probe) = session(true, 1000);
        probe.not_ready.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(s.wait_for_capture().await, Err(CaptureError::NotStreaming));
        assert!(matches!(s.status(), CaptureStatus::Failed(_)));
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);
    }
}
