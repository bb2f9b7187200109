//! Placement persistence across process restarts.
//!
//! Window handles are not stable across restarts, so records are keyed
//! by window name — the accepted cross-restart identity limitation: a
//! window whose title changed cannot be re-identified, and duplicate
//! titles match first-wins.
//!
//! Both directions are non-fatal: a missing or corrupt file at startup
//! yields an empty list, an unwritable file at shutdown is logged.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MirrorError;
use crate::mirror::{Mirror, Placement, lock};

// ── MirrorRecord ─────────────────────────────────────────────────

/// One persisted mirror: placement plus schedule policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub name: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: f32,
    pub opacity: u8,
    pub update_interval_ms: u64,
}

impl MirrorRecord {
    /// Snapshot a live mirror for persistence.
    pub fn from_mirror(mirror: &Mirror) -> Self {
        let placement = *lock(&mirror.placement);
        let schedule = *lock(&mirror.schedule);
        Self {
            name: mirror.name(),
            position: placement.position.to_array(),
            rotation: placement.rotation.to_array(),
            scale: placement.scale,
            opacity: placement.opacity,
            update_interval_ms: schedule.interval.as_millis() as u64,
        }
    }

    /// Apply the persisted placement to a freshly created mirror.
    pub fn apply_to(&self, mirror: &Mirror) {
        {
            let mut placement = lock(&mirror.placement);
            *placement = Placement {
                position: self.position.into(),
                rotation: glam::Quat::from_array(self.rotation),
                scale: self.scale,
                opacity: self.opacity,
                placed: true,
            };
        }
        lock(&mirror.schedule).interval = Duration::from_millis(self.update_interval_ms);
    }
}

// ── StateFile ────────────────────────────────────────────────────

/// On-disk JSON shape: one file per list (live, blacklist).
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    mirrors: Vec<MirrorRecord>,
}

/// Read a record list. Missing or malformed files yield an empty list.
pub fn load_records(path: &Path) -> Vec<MirrorRecord> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no persisted mirror list");
            return Vec::new();
        }
    };
    match serde_json::from_str::<StateFile>(&contents) {
        Ok(state) => state.mirrors,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "persisted mirror list malformed; ignoring");
            Vec::new()
        }
    }
}

/// Write a record list. The caller decides how loudly to log failure.
pub fn save_records(path: &Path, records: &[MirrorRecord]) -> Result<(), MirrorError> {
    let state = StateFile {
        mirrors: records.to_vec(),
    };
    let text = serde_json::to_string_pretty(&state)?;
    std::fs::write(path, text)?;
    Ok(())
}
