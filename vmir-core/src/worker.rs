//! Per-mirror capture workers.
//!
//! One long-lived OS thread per mirror, parked on a two-phase
//! rendezvous: a capacity-1 request channel and a capacity-1 done
//! channel. The channel capacities enforce that at most one capture is
//! outstanding per mirror.
//!
//! A failed capture leaves the frame buffer stale and still posts a
//! completion, so the scheduler is never stalled by a dying window.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::cursor::CursorSprite;
use crate::error::MirrorError;
use crate::mirror::{FrameBuffer, Mirror, lock};
use crate::port::{PixelMasks, RawWindowImage, WindowSystemPort};

// ── CaptureOutcome ───────────────────────────────────────────────

/// What a capture pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The frame buffer holds a fresh image of the given dimensions.
    Captured { width: u32, height: u32 },
    /// The capture failed; the buffer is unchanged (possibly stale).
    Failed,
}

// ── WorkerHandle ─────────────────────────────────────────────────

/// The orchestrator's end of one worker's rendezvous.
pub struct WorkerHandle {
    request_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<CaptureOutcome>,
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal the worker to capture. Returns
    /// [`MirrorError::RequestOutstanding`] if the previous capture has
    /// not completed — the scheduler's pass structure must prevent
    /// that.
    pub fn request_capture(&self) -> Result<(), MirrorError> {
        self.request_tx.try_send(()).map_err(|e| match e {
            TrySendError::Full(_) => MirrorError::RequestOutstanding,
            TrySendError::Closed(_) => MirrorError::WorkerGone,
        })
    }

    /// Wait for the outstanding capture to complete.
    pub async fn wait_capture_done(&mut self) -> Result<CaptureOutcome, MirrorError> {
        self.done_rx.recv().await.ok_or(MirrorError::WorkerGone)
    }

    /// Cancel the worker and join its thread.
    ///
    /// Shutdown takes priority over a pending capture request: the
    /// flag is raised before the wake, and the worker re-checks it
    /// after every wake before touching the window system. The join is
    /// prompt — at worst one in-flight capture finishes first.
    pub fn cancel(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the parked worker. Full means a wake is already queued.
        let _ = self.request_tx.try_send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the capture worker for `mirror`.
///
/// The worker holds its own `Arc<Mirror>`, so the frame buffer cannot
/// be freed while a capture is in flight even if the registry drops
/// the mirror first.
pub fn spawn_capture_worker(
    mirror: Arc<Mirror>,
    port: Arc<dyn WindowSystemPort>,
    cursor: Arc<Option<CursorSprite>>,
) -> Result<WorkerHandle, MirrorError> {
    let (request_tx, request_rx) = mpsc::channel(1);
    let (done_tx, done_rx) = mpsc::channel(1);
    let shutdown = Arc::new(AtomicBool::new(false));

    let thread = thread::Builder::new()
        .name(format!("capture-{}", mirror.handle()))
        .spawn({
            let shutdown = Arc::clone(&shutdown);
            move || worker_loop(mirror, port, cursor, shutdown, request_rx, done_tx)
        })
        .map_err(MirrorError::WorkerSpawn)?;

    Ok(WorkerHandle {
        request_tx,
        done_rx,
        shutdown,
        thread: Some(thread),
    })
}

fn worker_loop(
    mirror: Arc<Mirror>,
    port: Arc<dyn WindowSystemPort>,
    cursor: Arc<Option<CursorSprite>>,
    shutdown: Arc<AtomicBool>,
    mut request_rx: mpsc::Receiver<()>,
    done_tx: mpsc::Sender<CaptureOutcome>,
) {
    debug!(mirror = %mirror.name(), window = %mirror.handle(), "capture worker parked");
    while request_rx.blocking_recv().is_some() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let outcome = capture_once(&mirror, port.as_ref(), cursor.as_ref().as_ref());
        if done_tx.blocking_send(outcome).is_err() {
            break;
        }
    }
    debug!(mirror = %mirror.name(), "capture worker exited");
}

// ── Capture pass ─────────────────────────────────────────────────

fn capture_once(
    mirror: &Mirror,
    port: &dyn WindowSystemPort,
    cursor: Option<&CursorSprite>,
) -> CaptureOutcome {
    let image = match port.capture_window_pixels(mirror.handle()) {
        Ok(image) => image,
        Err(e) => {
            warn!(
                mirror = %mirror.name(),
                window = %mirror.handle(),
                error = %e,
                "capture failed; keeping stale frame"
            );
            return CaptureOutcome::Failed;
        }
    };

    if image.bits_per_pixel != 32 {
        warn!(
            mirror = %mirror.name(),
            bits_per_pixel = image.bits_per_pixel,
            "unsupported pixel depth; keeping stale frame"
        );
        return CaptureOutcome::Failed;
    }

    let opacity = lock(&mirror.placement).opacity;
    {
        let mut frame = lock(&mirror.frame);
        convert_to_rgba(&image, opacity, &mut frame);
    }

    // Burn the pointer in only while this window owns desktop focus
    // and the pointer actually sits inside it.
    if let Some(sprite) = cursor {
        overlay_cursor(mirror, port, sprite, &image);
    }

    CaptureOutcome::Captured {
        width: image.width,
        height: image.height,
    }
}

/// Convert a masked 32 bpp capture into the mirror's tightly packed
/// RGBA buffer, honoring the source stride. The buffer grows on
/// demand and never shrinks.
fn convert_to_rgba(image: &RawWindowImage, opacity: u8, frame: &mut FrameBuffer) {
    frame.ensure_size(image.width, image.height);
    let out = frame.pixels_mut();
    let masks = image.masks;

    for row in 0..image.height {
        for col in 0..image.width {
            let px = image.pixel_u32(col, row);
            let o = ((row * image.width + col) * 4) as usize;
            out[o] = PixelMasks::channel(masks.red, px);
            out[o + 1] = PixelMasks::channel(masks.green, px);
            out[o + 2] = PixelMasks::channel(masks.blue, px);
            out[o + 3] = opacity;
        }
    }
}

fn overlay_cursor(
    mirror: &Mirror,
    port: &dyn WindowSystemPort,
    sprite: &CursorSprite,
    image: &RawWindowImage,
) {
    let focused = matches!(port.current_input_focus(), Ok(f) if f == mirror.handle());
    if !focused {
        return;
    }
    let Ok(Some((x, y))) = port.pointer_position(mirror.handle()) else {
        return;
    };
    if x < 0 || y < 0 || x as u32 >= image.width || y as u32 >= image.height {
        return;
    }
    let mut frame = lock(&mirror.frame);
    sprite.composite_onto(&mut frame, x, y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{DEFAULT_UPDATE_INTERVAL, WindowHandle};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fake window system: one window with a scripted image, optional
    /// failure, and a controllable focus/pointer.
    struct FakePort {
        image: Mutex<Result<RawWindowImage, ()>>,
        focus: Mutex<WindowHandle>,
        pointer: Mutex<Option<(i32, i32)>>,
        capture_delay: Duration,
    }

    impl FakePort {
        fn with_image(image: RawWindowImage) -> Self {
            Self {
                image: Mutex::new(Ok(image)),
                focus: Mutex::new(WindowHandle(0)),
                pointer: Mutex::new(None),
                capture_delay: Duration::ZERO,
            }
        }
    }

    impl WindowSystemPort for FakePort {
        fn list_top_level_windows(
            &self,
        ) -> Result<Vec<(WindowHandle, Option<String>)>, MirrorError> {
            Ok(Vec::new())
        }

        fn capture_window_pixels(
            &self,
            _window: WindowHandle,
        ) -> Result<RawWindowImage, MirrorError> {
            std::thread::sleep(self.capture_delay);
            self.image
                .lock()
                .unwrap()
                .clone()
                .map_err(|_| MirrorError::MalformedProperty("window gone"))
        }

        fn pointer_position(
            &self,
            _window: WindowHandle,
        ) -> Result<Option<(i32, i32)>, MirrorError> {
            Ok(*self.pointer.lock().unwrap())
        }

        fn current_input_focus(&self) -> Result<WindowHandle, MirrorError> {
            Ok(*self.focus.lock().unwrap())
        }

        fn set_input_focus(&self, window: WindowHandle) -> Result<(), MirrorError> {
            *self.focus.lock().unwrap() = window;
            Ok(())
        }

        fn raise_window(&self, _window: WindowHandle) -> Result<(), MirrorError> {
            Ok(())
        }
    }

    /// 2×2 xrgb image: row stride padded to 12 bytes.
    fn test_image() -> RawWindowImage {
        let mut data = vec![0u8; 24];
        // (0,0) red, (1,0) green, (0,1) blue, (1,1) white.
        data[0..4].copy_from_slice(&0x00ff_0000u32.to_ne_bytes());
        data[4..8].copy_from_slice(&0x0000_ff00u32.to_ne_bytes());
        data[12..16].copy_from_slice(&0x0000_00ffu32.to_ne_bytes());
        data[16..20].copy_from_slice(&0x00ff_ffffu32.to_ne_bytes());
        RawWindowImage {
            width: 2,
            height: 2,
            bits_per_pixel: 32,
            stride: 12,
            masks: PixelMasks::XRGB,
            data,
        }
    }

    #[test]
    fn conversion_produces_rgba_with_opacity_alpha() {
        let mut frame = FrameBuffer::default();
        convert_to_rgba(&test_image(), 0x80, &mut frame);

        assert_eq!(&frame.pixels()[0..4], &[0xff, 0, 0, 0x80]); // red
        assert_eq!(&frame.pixels()[4..8], &[0, 0xff, 0, 0x80]); // green
        assert_eq!(&frame.pixels()[8..12], &[0, 0, 0xff, 0x80]); // blue
        assert_eq!(&frame.pixels()[12..16], &[0xff, 0xff, 0xff, 0x80]);
    }

    #[tokio::test]
    async fn capture_roundtrip_through_rendezvous() {
        let mirror = Arc::new(Mirror::new(
            WindowHandle(1),
            "term".into(),
            DEFAULT_UPDATE_INTERVAL,
        ));
        let port = Arc::new(FakePort::with_image(test_image()));
        let mut worker =
            spawn_capture_worker(Arc::clone(&mirror), port, Arc::new(None)).unwrap();

        worker.request_capture().unwrap();
        let outcome = worker.wait_capture_done().await.unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::Captured {
                width: 2,
                height: 2
            }
        );
        assert_eq!(lock(&mirror.frame).width(), 2);

        worker.cancel();
    }

    #[tokio::test]
    async fn second_request_while_outstanding_is_rejected() {
        let mirror = Arc::new(Mirror::new(
            WindowHandle(1),
            "term".into(),
            DEFAULT_UPDATE_INTERVAL,
        ));
        let mut port = FakePort::with_image(test_image());
        // Slow capture keeps the first request outstanding.
        port.capture_delay = Duration::from_millis(200);
        let mut worker =
            spawn_capture_worker(Arc::clone(&mirror), Arc::new(port), Arc::new(None)).unwrap();

        worker.request_capture().unwrap();
        // Wait until the worker dequeues it and enters the slow capture,
        // freeing the capacity-1 slot for one more request.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while worker.request_capture().is_err() {
            assert!(std::time::Instant::now() < deadline, "worker never woke");
            std::thread::sleep(Duration::from_millis(1));
        }
        // One capture mid-flight, one queued: a third must be rejected.
        assert!(matches!(
            worker.request_capture(),
            Err(MirrorError::RequestOutstanding)
        ));

        worker.wait_capture_done().await.unwrap();
        worker.wait_capture_done().await.unwrap();
        worker.cancel();
    }

    #[tokio::test]
    async fn failed_capture_still_signals_completion_and_keeps_stale_frame() {
        let mirror = Arc::new(Mirror::new(
            WindowHandle(1),
            "term".into(),
            DEFAULT_UPDATE_INTERVAL,
        ));
        let port = Arc::new(FakePort::with_image(test_image()));
        let mut worker =
            spawn_capture_worker(Arc::clone(&mirror), Arc::clone(&port) as Arc<dyn WindowSystemPort>, Arc::new(None))
                .unwrap();

        worker.request_capture().unwrap();
        worker.wait_capture_done().await.unwrap();
        let stale = lock(&mirror.frame).pixels().to_vec();

        // Window goes away: capture fails, completion still arrives.
        *port.image.lock().unwrap() = Err(());
        worker.request_capture().unwrap();
        let outcome = worker.wait_capture_done().await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Failed);
        assert_eq!(lock(&mirror.frame).pixels(), &stale[..]);

        worker.cancel();
    }

    #[tokio::test]
    async fn cursor_overlaid_only_when_window_focused_and_pointer_inside() {
        let mirror = Arc::new(Mirror::new(
            WindowHandle(1),
            "term".into(),
            DEFAULT_UPDATE_INTERVAL,
        ));
        let port = Arc::new(FakePort::with_image(test_image()));
        let cursor = CursorSprite::from_rgba(1, 1, vec![9, 9, 9, 255]);
        let mut worker = spawn_capture_worker(
            Arc::clone(&mirror),
            Arc::clone(&port) as Arc<dyn WindowSystemPort>,
            Arc::new(Some(cursor)),
        )
        .unwrap();

        // Unfocused: no cursor.
        worker.request_capture().unwrap();
        worker.wait_capture_done().await.unwrap();
        assert_eq!(&lock(&mirror.frame).pixels()[0..3], &[0xff, 0, 0]);

        // Focused with pointer at (0,0): cursor burnt in.
        port.set_input_focus(WindowHandle(1)).unwrap();
        *port.pointer.lock().unwrap() = Some((0, 0));
        worker.request_capture().unwrap();
        worker.wait_capture_done().await.unwrap();
        assert_eq!(&lock(&mirror.frame).pixels()[0..4], &[9, 9, 9, 255]);

        // Pointer outside the window: no cursor.
        *port.pointer.lock().unwrap() = Some((5, 5));
        worker.request_capture().unwrap();
        worker.wait_capture_done().await.unwrap();
        assert_eq!(&lock(&mirror.frame).pixels()[0..3], &[0xff, 0, 0]);

        worker.cancel();
    }

    #[tokio::test]
    async fn cancel_wakes_a_parked_worker() {
        let mirror = Arc::new(Mirror::new(
            WindowHandle(1),
            "term".into(),
            DEFAULT_UPDATE_INTERVAL,
        ));
        let port = Arc::new(FakePort::with_image(test_image()));
        let worker = spawn_capture_worker(mirror, port, Arc::new(None)).unwrap();

        // No request outstanding; cancel must not hang.
        tokio::task::spawn_blocking(move || worker.cancel())
            .await
            .unwrap();
    }
}
