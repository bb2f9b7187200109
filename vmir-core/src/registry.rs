//! Reconciliation of the live window list against tracked mirrors.
//!
//! Windows come and go without destruction notifications, so the
//! registry runs a generation-counter mark-and-sweep: every live,
//! non-blacklisted handle is stamped with the current era; after a
//! full pass, any mirror left with a stale stamp has disappeared and
//! is removed — cancelling its capture worker exactly once — and only
//! then does the era advance.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cursor::CursorSprite;
use crate::error::MirrorError;
use crate::mirror::{Mirror, WindowHandle};
use crate::persist::MirrorRecord;
use crate::port::WindowSystemPort;
use crate::worker::{CaptureOutcome, WorkerHandle, spawn_capture_worker};

// ── MirrorEntry ──────────────────────────────────────────────────

struct MirrorEntry {
    mirror: Arc<Mirror>,
    worker: WorkerHandle,
}

// ── MirrorRegistry ───────────────────────────────────────────────

/// Owns the set of live mirrors and the blacklist. Mutated only by
/// the orchestrator thread; other threads see mirrors through `Arc`
/// snapshots.
pub struct MirrorRegistry {
    port: Arc<dyn WindowSystemPort>,
    cursor: Arc<Option<CursorSprite>>,
    default_interval: Duration,
    entries: HashMap<WindowHandle, MirrorEntry>,
    /// Handles never allowed back into the live registry.
    blacklist: HashSet<WindowHandle>,
    /// Persisted blacklist records (kept for the next save).
    blacklist_records: Vec<MirrorRecord>,
    /// Blacklist names not yet resolved to a handle. Consumed on the
    /// first reconciliation pass only — matching the startup-only
    /// resolution of name-keyed state.
    unresolved_blacklist: Vec<String>,
    /// Saved placements awaiting a live window of the same name.
    saved_placements: HashMap<String, MirrorRecord>,
    era: u64,
    first_pass_done: bool,
}

impl MirrorRegistry {
    /// Build a registry seeded with persisted state.
    pub fn new(
        port: Arc<dyn WindowSystemPort>,
        cursor: Arc<Option<CursorSprite>>,
        default_interval: Duration,
        saved_live: Vec<MirrorRecord>,
        saved_blacklist: Vec<MirrorRecord>,
    ) -> Self {
        let unresolved_blacklist = saved_blacklist.iter().map(|r| r.name.clone()).collect();
        // Duplicate titles collapse to one record: first match wins,
        // the accepted limitation of name-keyed identity.
        let saved_placements = saved_live
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        Self {
            port,
            cursor,
            default_interval,
            entries: HashMap::new(),
            blacklist: HashSet::new(),
            blacklist_records: saved_blacklist,
            unresolved_blacklist,
            saved_placements,
            era: 1,
            first_pass_done: false,
        }
    }

    /// Reconcile against a fresh window listing.
    pub fn reconcile(&mut self, live: &[(WindowHandle, Option<String>)]) {
        for (handle, reported_name) in live {
            let handle = *handle;
            let name = reported_name
                .clone()
                .unwrap_or_else(|| format!("noname_{handle}"));

            if !self.first_pass_done {
                if let Some(idx) = self.unresolved_blacklist.iter().position(|n| *n == name) {
                    self.unresolved_blacklist.swap_remove(idx);
                    self.blacklist.insert(handle);
                    debug!(window = %handle, name = %name, "blacklisted by persisted name");
                    continue;
                }
            }
            if self.blacklist.contains(&handle) {
                debug!(window = %handle, "black listed");
                continue;
            }

            if let Some(entry) = self.entries.get(&handle) {
                entry.mirror.set_name(name);
                entry.mirror.set_era(self.era);
            } else {
                self.create_mirror(handle, name);
            }
        }

        // Sweep: anything not stamped this pass has disappeared.
        let stale: Vec<WindowHandle> = self
            .entries
            .iter()
            .filter(|(_, e)| e.mirror.era() != self.era)
            .map(|(&h, _)| h)
            .collect();
        for handle in stale {
            if let Some(entry) = self.entries.remove(&handle) {
                info!(
                    mirror = %entry.mirror.name(),
                    window = %handle,
                    "window disappeared; dropping mirror"
                );
                entry.worker.cancel();
            }
        }

        self.era += 1;
        self.first_pass_done = true;
    }

    fn create_mirror(&mut self, handle: WindowHandle, name: String) {
        let mirror = Arc::new(Mirror::new(handle, name.clone(), self.default_interval));
        if let Some(record) = self.saved_placements.remove(&name) {
            record.apply_to(&mirror);
            info!(mirror = %name, "restored persisted placement");
        }
        mirror.set_era(self.era);

        match spawn_capture_worker(
            Arc::clone(&mirror),
            Arc::clone(&self.port),
            Arc::clone(&self.cursor),
        ) {
            Ok(worker) => {
                info!(mirror = %name, window = %handle, "new mirror created");
                self.entries.insert(handle, MirrorEntry { mirror, worker });
            }
            Err(e) => error!(mirror = %name, error = %e, "cannot start capture worker"),
        }
    }

    /// Blacklist a mirror irrevocably for the process lifetime. Any
    /// in-flight capture is cancelled before the entry is dropped.
    pub fn blacklist(&mut self, handle: WindowHandle) {
        if let Some(entry) = self.entries.remove(&handle) {
            info!(mirror = %entry.mirror.name(), window = %handle, "blacklisting mirror");
            self.blacklist_records
                .push(MirrorRecord::from_mirror(&entry.mirror));
            entry.worker.cancel();
        }
        self.blacklist.insert(handle);
    }

    /// Cancel every worker. Called once at shutdown, before the state
    /// files are written and the window-system connection dropped.
    pub fn shutdown_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.worker.cancel();
        }
    }

    /// Arc snapshot of the live mirrors, for scheduling and rebuild
    /// requests.
    pub fn snapshot(&self) -> Vec<Arc<Mirror>> {
        self.entries.values().map(|e| Arc::clone(&e.mirror)).collect()
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn is_blacklisted(&self, handle: WindowHandle) -> bool {
        self.blacklist.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Signal a mirror's worker to capture.
    pub fn request_capture(&self, handle: WindowHandle) -> Result<(), MirrorError> {
        self.entries
            .get(&handle)
            .ok_or(MirrorError::WorkerGone)?
            .worker
            .request_capture()
    }

    /// Await a mirror's outstanding capture.
    pub async fn wait_capture_done(
        &mut self,
        handle: WindowHandle,
    ) -> Result<CaptureOutcome, MirrorError> {
        self.entries
            .get_mut(&handle)
            .ok_or(MirrorError::WorkerGone)?
            .worker
            .wait_capture_done()
            .await
    }

    /// Records for the live list, persisted at shutdown.
    pub fn live_records(&self) -> Vec<MirrorRecord> {
        self.entries
            .values()
            .map(|e| MirrorRecord::from_mirror(&e.mirror))
            .collect()
    }

    /// Records for the blacklist, persisted at shutdown.
    pub fn blacklist_records(&self) -> Vec<MirrorRecord> {
        self.blacklist_records.clone()
    }
}
