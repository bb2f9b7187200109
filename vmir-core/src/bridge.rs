//! Cross-thread handoff into the graphics-owning thread.
//!
//! GPU-resource mutation is only safe on the thread that owns the
//! graphics context, so every other thread marshals tagged requests
//! through a bounded multi-producer channel and never touches GPU
//! state directly. The graphics thread drains the channel once per
//! frame, FIFO, and acknowledges rebuilds; the orchestrator waits for
//! that acknowledgment with a bounded timeout instead of hanging on an
//! unresponsive renderer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{error, warn};

use crate::error::MirrorError;
use crate::mirror::Mirror;

// ── SceneRequest ─────────────────────────────────────────────────

/// A marshaled ask from a producer thread to the graphics owner.
#[derive(Debug, Clone)]
pub enum SceneRequest {
    /// Upload this mirror's freshly captured pixels to its texture.
    Upload(Arc<Mirror>),
    /// Recompose the draw list from this registry snapshot. Carrying
    /// the snapshot keeps the graphics thread off the live mirror
    /// list.
    Rebuild { mirrors: Vec<Arc<Mirror>> },
}

/// Create a connected bridge/mailbox pair with the given queue depth.
pub fn scene_channel(capacity: usize) -> (SceneBridge, SceneMailbox) {
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (ack_tx, ack_rx) = mpsc::channel(16);
    (
        SceneBridge { request_tx, ack_rx },
        SceneMailbox { request_rx, ack_tx },
    )
}

// ── SceneBridge (producer side) ──────────────────────────────────

/// Producer handle. Requests are enqueued without blocking; a full
/// queue drops the request with a warning — the next scheduling pass
/// issues fresh ones.
pub struct SceneBridge {
    request_tx: mpsc::Sender<SceneRequest>,
    ack_rx: mpsc::Receiver<()>,
}

impl SceneBridge {
    /// A cloneable sender for additional producer threads.
    pub fn requester(&self) -> mpsc::Sender<SceneRequest> {
        self.request_tx.clone()
    }

    /// Ask the graphics thread to upload this mirror's pixels.
    pub fn request_upload(&self, mirror: &Arc<Mirror>) {
        if self
            .request_tx
            .try_send(SceneRequest::Upload(Arc::clone(mirror)))
            .is_err()
        {
            warn!(mirror = %mirror.name(), "scene queue unavailable; dropping upload request");
        }
    }

    /// Ask the graphics thread to recompose the scene from `mirrors`.
    pub fn request_rebuild(&self, mirrors: Vec<Arc<Mirror>>) {
        if self
            .request_tx
            .try_send(SceneRequest::Rebuild { mirrors })
            .is_err()
        {
            warn!("scene queue unavailable; dropping rebuild request");
        }
    }

    /// Block until the graphics thread acknowledges the rebuild, or
    /// until `timeout` expires. Expiry is a liveness warning, not a
    /// reason to retry — orchestration simply continues.
    pub async fn await_rebuild_ack(&mut self, timeout: Duration) -> Result<(), MirrorError> {
        match tokio::time::timeout(timeout, self.ack_rx.recv()).await {
            Ok(Some(())) => Ok(()),
            Ok(None) => Err(MirrorError::SceneChannelClosed),
            Err(_) => {
                error!(timeout_ms = timeout.as_millis() as u64, "scene thread not responding");
                Err(MirrorError::RebuildAckTimeout(timeout))
            }
        }
    }
}

// ── SceneMailbox (graphics-thread side) ──────────────────────────

/// Everything the graphics thread owes for one frame.
#[derive(Debug, Default)]
pub struct FrameBatch {
    /// Mirrors to upload, FIFO, at most one entry per mirror.
    pub uploads: Vec<Arc<Mirror>>,
    /// The most recent rebuild snapshot, if any rebuild was requested.
    pub rebuild: Option<Vec<Arc<Mirror>>>,
    /// How many rebuild requests were drained (each owes one ack).
    pub rebuild_requests: usize,
}

/// The single consumer, owned by the graphics thread.
pub struct SceneMailbox {
    request_rx: mpsc::Receiver<SceneRequest>,
    ack_tx: mpsc::Sender<()>,
}

impl SceneMailbox {
    /// Drain everything queued so far, FIFO. Multiple uploads for the
    /// same mirror collapse into the first (one GPU upload per mirror
    /// per frame); multiple rebuilds collapse into the latest snapshot
    /// but each is still acknowledged.
    pub fn collect_frame(&mut self) -> FrameBatch {
        let mut batch = FrameBatch::default();
        let mut seen = HashSet::new();
        loop {
            match self.request_rx.try_recv() {
                Ok(SceneRequest::Upload(mirror)) => {
                    if seen.insert(mirror.handle()) {
                        batch.uploads.push(mirror);
                    }
                }
                Ok(SceneRequest::Rebuild { mirrors }) => {
                    batch.rebuild = Some(mirrors);
                    batch.rebuild_requests += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    /// Post one acknowledgment per drained rebuild request, after the
    /// rebuild has actually happened.
    pub fn acknowledge(&self, rebuild_requests: usize) {
        for _ in 0..rebuild_requests {
            let _ = self.ack_tx.try_send(());
        }
    }
}
