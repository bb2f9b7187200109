//! # vmir-core
//!
//! Live window mirroring for head-mounted displays: desktop windows
//! are discovered, captured on independent cadences, composed into
//! 3-D quads, and focused by gaze.
//!
//! This crate contains:
//! - **Port**: `WindowSystemPort` — the narrow seam to the desktop
//!   (X11 implementation included)
//! - **Registry**: `MirrorRegistry` — era mark-and-sweep window-set
//!   reconciliation with a persistent blacklist
//! - **Scheduler**: `UpdateScheduler` — earliest-deadline wakes with
//!   focus-adaptive cadence
//! - **Worker**: `CaptureWorker` rendezvous — one thread per mirror,
//!   at most one outstanding capture
//! - **Bridge**: `SceneBridge`/`SceneMailbox` — the only path into the
//!   graphics-owning thread
//! - **Scene**: `SceneRenderer` over the `RenderBackend` seam
//! - **Picker**: `FocusPicker` — gaze-ray z-order arbitration and
//!   desktop focus transfer
//! - **Service**: `MirrorService` — the orchestration loop
//! - **Error**: `MirrorError` — typed, `thiserror`-based hierarchy

pub mod bridge;
pub mod cursor;
pub mod error;
pub mod mirror;
pub mod persist;
pub mod picker;
pub mod port;
pub mod registry;
pub mod scene;
pub mod scheduler;
pub mod service;
pub mod worker;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::{FrameBatch, SceneBridge, SceneMailbox, SceneRequest, scene_channel};
pub use cursor::CursorSprite;
pub use error::MirrorError;
pub use mirror::{
    DEFAULT_OPACITY, DEFAULT_SCALE, DEFAULT_UPDATE_INTERVAL, FrameBuffer, Mirror, Placement,
    QuadCorners, Schedule, TextureId, TextureSlot, WindowHandle,
};
pub use persist::MirrorRecord;
pub use picker::{FocusPicker, ray_quad_intersect, ray_triangle_intersect};
pub use port::{PixelMasks, RawWindowImage, WindowSystemPort, x11::X11Port};
pub use registry::MirrorRegistry;
pub use scene::{RenderBackend, SceneQuad, SceneRenderer, ViewerPose, drain_frame};
pub use scheduler::UpdateScheduler;
pub use service::{ControlEvent, MirrorPolicy, MirrorService, StatePaths};
pub use worker::{CaptureOutcome, WorkerHandle, spawn_capture_worker};
