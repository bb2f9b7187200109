//! The mirroring orchestrator.
//!
//! One long-lived task drives the whole pipeline: sleep until the
//! earliest capture deadline, reconcile the window list, fan capture
//! requests out to the due mirrors' workers, rendezvous on their
//! completions, hand the uploads and one rebuild to the graphics
//! thread, and wait (bounded) for the rebuild acknowledgment.
//!
//! Sleeping targets an absolute deadline, so scheduling drift does not
//! accumulate across passes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::SceneBridge;
use crate::cursor::CursorSprite;
use crate::error::MirrorError;
use crate::mirror::{DEFAULT_UPDATE_INTERVAL, lock};
use crate::persist;
use crate::picker::FocusPicker;
use crate::port::WindowSystemPort;
use crate::registry::MirrorRegistry;
use crate::scheduler::UpdateScheduler;
use crate::worker::CaptureOutcome;

// ── Policy ───────────────────────────────────────────────────────

/// Tunables of the orchestration loop. The defaults are observed-good
/// values, not derived ones.
#[derive(Debug, Clone)]
pub struct MirrorPolicy {
    /// Update interval given to newly discovered mirrors.
    pub default_interval: Duration,
    /// Wake delay while no mirrors are tracked.
    pub fallback_delay: Duration,
    /// Focused mirrors refresh this many times faster.
    pub focus_divisor: u32,
    /// Bounded wait for the graphics thread's rebuild acknowledgment.
    pub rebuild_ack_timeout: Duration,
}

impl Default for MirrorPolicy {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_UPDATE_INTERVAL,
            fallback_delay: Duration::from_millis(50),
            focus_divisor: 4,
            rebuild_ack_timeout: Duration::from_millis(500),
        }
    }
}

// ── ControlEvent ─────────────────────────────────────────────────

/// In-scene shortcuts, routed in from the input collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    /// Toggle drag mode on the focused mirror.
    ToggleDrag,
    /// Blacklist the focused mirror irrevocably.
    BlacklistFocused,
    /// Multiply the focused mirror's scale (drag mode only).
    ScaleFocused(f32),
    /// Stop the service.
    Shutdown,
}

// ── MirrorService ────────────────────────────────────────────────

/// Where the two persisted lists live.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub live: PathBuf,
    pub blacklist: PathBuf,
}

impl StatePaths {
    /// `master_list.json` / `black_list.json` under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            live: dir.join("master_list.json"),
            blacklist: dir.join("black_list.json"),
        }
    }
}

/// Orchestrates discovery, scheduling, capture fan-out, and the scene
/// handoff for the whole mirror set.
pub struct MirrorService {
    port: Arc<dyn WindowSystemPort>,
    registry: MirrorRegistry,
    scheduler: UpdateScheduler,
    bridge: SceneBridge,
    picker: Arc<FocusPicker>,
    policy: MirrorPolicy,
    control_rx: mpsc::Receiver<ControlEvent>,
    control_closed: bool,
    shutdown: CancellationToken,
    state_paths: StatePaths,
}

impl MirrorService {
    /// Assemble the service, restoring persisted state from
    /// `state_paths`. Returns the control-event sender the input
    /// collaborator feeds.
    pub fn new(
        port: Arc<dyn WindowSystemPort>,
        bridge: SceneBridge,
        picker: Arc<FocusPicker>,
        cursor: Arc<Option<CursorSprite>>,
        policy: MirrorPolicy,
        state_paths: StatePaths,
    ) -> (Self, mpsc::Sender<ControlEvent>) {
        let saved_live = persist::load_records(&state_paths.live);
        let saved_blacklist = persist::load_records(&state_paths.blacklist);
        info!(
            live = saved_live.len(),
            blacklisted = saved_blacklist.len(),
            "persisted mirror lists loaded"
        );

        let registry = MirrorRegistry::new(
            Arc::clone(&port),
            cursor,
            policy.default_interval,
            saved_live,
            saved_blacklist,
        );
        let scheduler = UpdateScheduler {
            fallback_delay: policy.fallback_delay,
            focus_divisor: policy.focus_divisor,
        };
        let (control_tx, control_rx) = mpsc::channel(16);

        (
            Self {
                port,
                registry,
                scheduler,
                bridge,
                picker,
                policy,
                control_rx,
                control_closed: false,
                shutdown: CancellationToken::new(),
                state_paths,
            },
            control_tx,
        )
    }

    /// Token that stops the run loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shut down. Workers are cancelled and placement
    /// persisted before this returns — the caller may then drop the
    /// window-system connection.
    pub async fn run(mut self) -> Result<(), MirrorError> {
        info!("window mirroring service started");

        loop {
            let wake = self
                .scheduler
                .next_wake_time(&self.registry.snapshot(), Instant::now());

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.control_rx.recv(), if !self.control_closed => {
                    match event {
                        Some(event) => {
                            self.handle_control(event);
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                        }
                        // All control senders gone; keep mirroring.
                        None => self.control_closed = true,
                    }
                    continue;
                }
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(wake)) => {}
            }

            debug!("------------------------------------------------");
            self.run_pass().await;
        }

        info!("mirroring service stopping");
        self.registry.shutdown_all();
        self.persist_state();
        Ok(())
    }

    /// One scheduling pass: reconcile, select, capture, hand off.
    async fn run_pass(&mut self) {
        match self.port.list_top_level_windows() {
            Ok(live) => self.registry.reconcile(&live),
            Err(e) => {
                error!(error = %e, "window listing failed; skipping reconciliation");
            }
        }

        let now = Instant::now();
        let due = self.scheduler.select_due(&self.registry.snapshot(), now);
        if due.is_empty() {
            return;
        }
        debug!(due = due.len(), "capture pass");

        // Fan out all requests first, then rendezvous on completions
        // in the same order. A mirror can be swept between the two
        // steps only by a later pass, never mid-pass.
        for mirror in &due {
            if let Err(e) = self.registry.request_capture(mirror.handle()) {
                warn!(mirror = %mirror.name(), error = %e, "capture request failed");
            }
        }
        for mirror in &due {
            match self.registry.wait_capture_done(mirror.handle()).await {
                Ok(CaptureOutcome::Captured { .. }) => self.bridge.request_upload(mirror),
                Ok(CaptureOutcome::Failed) => {
                    // Logged by the worker; self-heals on a later pass
                    // or gets swept with the window.
                }
                Err(e) => warn!(mirror = %mirror.name(), error = %e, "capture rendezvous lost"),
            }
        }

        // All same-pass uploads are queued ahead of this rebuild; the
        // mailbox drains FIFO. Expiry is already logged, and the next
        // pass issues fresh requests either way.
        self.bridge.request_rebuild(self.registry.snapshot());
        let _ = self
            .bridge
            .await_rebuild_ack(self.policy.rebuild_ack_timeout)
            .await;
    }

    fn handle_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::ToggleDrag => {
                let on = self.picker.toggle_drag();
                info!(drag = on, "drag mode toggled");
            }
            ControlEvent::BlacklistFocused => {
                let Some(mirror) = self.picker.focused_mirror() else {
                    return;
                };
                self.registry.blacklist(mirror.handle());
                self.picker.clear_focus(mirror.handle());
            }
            ControlEvent::ScaleFocused(factor) => {
                if !self.picker.drag_mode() {
                    return;
                }
                let Some(mirror) = self.picker.focused_mirror() else {
                    return;
                };
                let mut placement = lock(&mirror.placement);
                let scaled = placement.scale * factor;
                if scaled > 0.0 {
                    placement.scale = scaled;
                    debug!(mirror = %mirror.name(), scale = %scaled, "rescaled");
                }
            }
            ControlEvent::Shutdown => self.shutdown.cancel(),
        }
    }

    fn persist_state(&self) {
        if let Err(e) = persist::save_records(&self.state_paths.live, &self.registry.live_records())
        {
            warn!(error = %e, "could not write live mirror list");
        }
        if let Err(e) = persist::save_records(
            &self.state_paths.blacklist,
            &self.registry.blacklist_records(),
        ) {
            warn!(error = %e, "could not write blacklist");
        }
    }
}
