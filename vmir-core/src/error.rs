//! Domain-specific error types for the mirroring pipeline.
//!
//! All fallible operations return `Result<T, MirrorError>`.
//! Per-mirror failures are recoverable and never abort other mirrors;
//! only the loss of the window-system connection at startup is fatal.

use std::time::Duration;

use thiserror::Error;

/// The canonical error type for the mirroring pipeline.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Window system ────────────────────────────────────────────
    /// Could not open a connection to the window system. Fatal at
    /// startup — nothing can be mirrored without it.
    #[error("cannot connect to the window system: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    /// The window-system connection broke mid-request.
    #[error("window system connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    /// A window-system request was answered with an error (window
    /// closed mid-capture, bad handle, ...).
    #[error("window system request failed: {0}")]
    Request(#[from] x11rb::errors::ReplyError),

    /// The captured image uses a pixel layout the pipeline does not
    /// mirror. Only 32 bits per pixel is supported downstream.
    #[error("unsupported pixel depth: {bits_per_pixel} bpp (only 32 bpp is mirrored)")]
    UnsupportedPixelDepth { bits_per_pixel: u8 },

    /// A root-window property had an unexpected format.
    #[error("malformed window-system property: {0}")]
    MalformedProperty(&'static str),

    // ── Capture rendezvous ───────────────────────────────────────
    /// A capture was requested while the previous one was still
    /// outstanding. The scheduler must never let this happen.
    #[error("capture request already outstanding for this mirror")]
    RequestOutstanding,

    /// The capture worker thread is gone (cancelled or crashed).
    #[error("capture worker is gone")]
    WorkerGone,

    /// The worker thread could not be spawned.
    #[error("failed to spawn capture worker: {0}")]
    WorkerSpawn(std::io::Error),

    // ── Scene handoff ────────────────────────────────────────────
    /// The graphics thread dropped its end of the scene channel.
    #[error("scene channel closed")]
    SceneChannelClosed,

    /// The graphics thread did not acknowledge a rebuild within the
    /// bounded wait. Logged as a liveness warning; the next scheduling
    /// pass issues fresh requests.
    #[error("scene rebuild not acknowledged within {0:?}")]
    RebuildAckTimeout(Duration),

    // ── Persistence ──────────────────────────────────────────────
    /// Reading or writing a state file failed.
    #[error("state file I/O error: {0}")]
    StateIo(#[from] std::io::Error),

    /// A state file did not parse.
    #[error("state file malformed: {0}")]
    StateFormat(#[from] serde_json::Error),
}
