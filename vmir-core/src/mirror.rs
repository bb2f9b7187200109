//! The tracked representation of one desktop window.
//!
//! Each field group has one owner: the orchestrator owns scheduling,
//! the capture worker writes the frame buffer, the graphics thread
//! owns corners and the texture slot, and the cross-thread flags are
//! atomics.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};

/// Default uniform scale — maps a ~768-pixel-wide window to roughly two
/// world units.
pub const DEFAULT_SCALE: f32 = 1.0 / 384.0;

/// Default opacity for mirrored quads.
pub const DEFAULT_OPACITY: u8 = 0x80;

/// Default re-capture interval.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Lock a mutex, tolerating poisoning. A poisoned lock only means some
/// thread panicked mid-write; the guarded state is still safe to read
/// and the pipeline self-heals on the next capture.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── WindowHandle ─────────────────────────────────────────────────

/// Opaque window identity. Stable for the window's lifetime, not
/// across process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u32);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WindowHandle {
    fn from(id: u32) -> Self {
        WindowHandle(id)
    }
}

// ── Placement ────────────────────────────────────────────────────

/// Where a mirror sits in the scene.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    /// World-space position of the quad center.
    pub position: Vec3,
    /// Orientation of the quad.
    pub rotation: Quat,
    /// Uniform scale from window pixels to world units.
    pub scale: f32,
    /// Quad opacity, written into the alpha channel at capture time.
    pub opacity: u8,
    /// `false` until the mirror has been placed (restored from disk,
    /// auto-placed in front of the viewer, or dragged). Consumers must
    /// treat an unplaced mirror as "position it at next rebuild".
    pub placed: bool,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: DEFAULT_SCALE,
            opacity: DEFAULT_OPACITY,
            placed: false,
        }
    }
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// The mirror's captured pixels, tightly packed RGBA.
///
/// Written exclusively by the mirror's capture worker and read
/// exclusively by the graphics thread during upload; the rendezvous
/// guarantees the two never overlap, the mutex makes it safe anyway.
///
/// The backing allocation only ever grows. A window that shrinks keeps
/// its old allocation to avoid churn; `width`/`height` describe the
/// current frame, `pixels()` returns exactly that much.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Current frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// True until the first successful capture.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Resize to `width` × `height`, growing the allocation if it is
    /// undersized and never shrinking it.
    pub fn ensure_size(&mut self, width: u32, height: u32) {
        let needed = width as usize * height as usize * 4;
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
        self.width = width;
        self.height = height;
    }

    /// The current frame's RGBA bytes (`width * height * 4`).
    pub fn pixels(&self) -> &[u8] {
        &self.data[..self.width as usize * self.height as usize * 4]
    }

    /// Mutable access for the capture worker.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        let len = self.width as usize * self.height as usize * 4;
        &mut self.data[..len]
    }

    /// Capacity of the backing allocation in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

// ── Schedule ─────────────────────────────────────────────────────

/// When a mirror is next due for re-capture.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    /// Configured update interval (quartered while focused).
    pub interval: Duration,
    /// Absolute deadline of the next capture.
    pub next_due: Instant,
}

// ── QuadCorners ──────────────────────────────────────────────────

/// World-space corners of a mirror's rendered quad, written during the
/// graphics thread's rebuild pass and read only by the focus picker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadCorners {
    /// Lower left.
    pub ld: Vec3,
    /// Lower right.
    pub rd: Vec3,
    /// Upper left.
    pub lu: Vec3,
    /// Upper right.
    pub ru: Vec3,
}

// ── TextureSlot ──────────────────────────────────────────────────

/// Backend texture identifier. Opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// A backend texture bound to specific pixel dimensions. Whenever the
/// captured dimensions change the slot must be destroyed and recreated.
#[derive(Debug, Clone, Copy)]
pub struct TextureSlot {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
}

// ── Mirror ───────────────────────────────────────────────────────

/// One tracked window surfaced in the 3-D scene.
pub struct Mirror {
    handle: WindowHandle,
    name: Mutex<String>,
    era: AtomicU64,
    has_focus: AtomicBool,
    /// Scene placement. Mutated by the graphics thread (auto-place,
    /// drag) and by control events (scale); persisted at shutdown.
    pub placement: Mutex<Placement>,
    /// Captured pixels. Worker writes, graphics thread reads.
    pub frame: Mutex<FrameBuffer>,
    /// Re-capture schedule. Orchestrator only.
    pub schedule: Mutex<Schedule>,
    /// Quad corners. Graphics thread only; `None` until the first
    /// rebuild has positioned the mirror.
    pub corners: Mutex<Option<QuadCorners>>,
    /// GPU texture slot. Graphics thread only.
    pub texture: Mutex<Option<TextureSlot>>,
}

impl Mirror {
    /// Create an unpositioned mirror due for its first capture one
    /// interval from now.
    pub fn new(handle: WindowHandle, name: String, interval: Duration) -> Self {
        Self {
            handle,
            name: Mutex::new(name),
            era: AtomicU64::new(0),
            has_focus: AtomicBool::new(false),
            placement: Mutex::new(Placement::default()),
            frame: Mutex::new(FrameBuffer::default()),
            schedule: Mutex::new(Schedule {
                interval,
                next_due: Instant::now() + interval,
            }),
            corners: Mutex::new(None),
            texture: Mutex::new(None),
        }
    }

    /// The immutable window identity.
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    /// Best-effort display name. May collide with other windows;
    /// identity is always the handle.
    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    /// Refresh the display name from discovery.
    pub fn set_name(&self, name: String) {
        *lock(&self.name) = name;
    }

    /// Era tag last stamped by reconciliation.
    pub fn era(&self) -> u64 {
        self.era.load(Ordering::Acquire)
    }

    /// Stamp the mirror as seen in the given era.
    pub fn set_era(&self, era: u64) {
        self.era.store(era, Ordering::Release);
    }

    /// Whether this mirror's window owns desktop input focus.
    pub fn has_focus(&self) -> bool {
        self.has_focus.load(Ordering::Acquire)
    }

    pub fn set_has_focus(&self, focused: bool) {
        self.has_focus.store(focused, Ordering::Release);
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("handle", &self.handle)
            .field("name", &self.name())
            .field("era", &self.era())
            .field("has_focus", &self.has_focus())
            .finish_non_exhaustive()
    }
}
