//! Earliest-deadline wake scheduling across an unbounded mirror set.
//!
//! Each mirror carries its own update interval; the orchestrator asks
//! for the single next point in time *any* mirror needs re-capture and
//! sleeps until that absolute deadline. Focused mirrors are refreshed
//! on a quartered interval so the window the user is looking at stays
//! fresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::mirror::{Mirror, lock};

// ── UpdateScheduler ──────────────────────────────────────────────

/// Deadline selection policy. The constants are observed defaults,
/// not derived — treat them as tunables.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    /// Wake delay when no mirrors are tracked.
    pub fallback_delay: Duration,
    /// A focused mirror's interval is divided by this.
    pub focus_divisor: u32,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self {
            fallback_delay: Duration::from_millis(50),
            focus_divisor: 4,
        }
    }
}

impl UpdateScheduler {
    /// The next absolute instant any mirror is due, or `now +
    /// fallback_delay` for an empty registry.
    ///
    /// A deadline already in the past is reported as an overrun and
    /// returned as-is — the sleep degenerates to a no-op; the
    /// scheduler never sleeps tighter than the computed time and never
    /// busy-spins.
    pub fn next_wake_time(&self, mirrors: &[Arc<Mirror>], now: Instant) -> Instant {
        let Some(next) = mirrors
            .iter()
            .map(|m| lock(&m.schedule).next_due)
            .min()
        else {
            return now + self.fallback_delay;
        };

        if next <= now {
            warn!(
                overrun_ms = now.duration_since(next).as_millis() as u64,
                "capture deadline overrun; system too slow"
            );
        } else {
            debug!(
                sleep_ms = next.duration_since(now).as_millis() as u64,
                "sleeping until next capture deadline"
            );
        }
        next
    }

    /// All mirrors whose due time has passed. Each selected mirror's
    /// deadline is advanced in the same lock acquisition, so a mirror
    /// cannot be selected twice for one outstanding capture.
    pub fn select_due(&self, mirrors: &[Arc<Mirror>], now: Instant) -> Vec<Arc<Mirror>> {
        let mut due = Vec::new();
        for mirror in mirrors {
            let mut schedule = lock(&mirror.schedule);
            if schedule.next_due > now {
                continue;
            }
            let interval = if mirror.has_focus() {
                schedule.interval / self.focus_divisor.max(1)
            } else {
                schedule.interval
            };
            schedule.next_due = now + interval;
            due.push(Arc::clone(mirror));
        }
        due
    }
}
