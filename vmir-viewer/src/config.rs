//! Viewer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vmir_core::MirrorPolicy;

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Capture scheduling.
    pub scheduling: SchedulingConfig,
    /// Scene handoff and frame loop.
    pub scene: SceneConfig,
    /// Persisted state and assets.
    pub state: StateConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Capture scheduling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Update interval for newly discovered windows (ms).
    pub default_interval_ms: u64,
    /// Wake delay while no windows are tracked (ms).
    pub fallback_delay_ms: u64,
    /// Focused windows refresh this many times faster.
    pub focus_divisor: u32,
}

/// Scene handoff and frame loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Bounded wait for the rebuild acknowledgment (ms).
    pub ack_timeout_ms: u64,
    /// Scene request queue depth.
    pub queue_depth: usize,
    /// Graphics frame rate.
    pub frame_rate: u32,
}

/// Persisted state and assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding `master_list.json` and `black_list.json`.
    pub dir: String,
    /// Pointer sprite burnt into focused captures.
    pub cursor_sprite: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (overridden by `RUST_LOG`).
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingConfig::default(),
            scene: SceneConfig::default(),
            state: StateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 200,
            fallback_delay_ms: 50,
            focus_divisor: 4,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 500,
            queue_depth: 128,
            frame_rate: 60,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: ".".into(),
            cursor_sprite: "cursor16.png".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The scheduling/handoff policy the core runs with.
    pub fn policy(&self) -> MirrorPolicy {
        MirrorPolicy {
            default_interval: Duration::from_millis(self.scheduling.default_interval_ms),
            fallback_delay: Duration::from_millis(self.scheduling.fallback_delay_ms),
            focus_divisor: self.scheduling.focus_divisor.max(1),
            rebuild_ack_timeout: Duration::from_millis(self.scene.ack_timeout_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ViewerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("default_interval_ms"));
        assert!(text.contains("queue_depth"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ViewerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ViewerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.scheduling.default_interval_ms, 200);
        assert_eq!(parsed.scene.frame_rate, 60);
    }

    #[test]
    fn policy_conversion() {
        let mut cfg = ViewerConfig::default();
        cfg.scheduling.focus_divisor = 0; // clamped to 1
        let policy = cfg.policy();
        assert_eq!(policy.default_interval, Duration::from_millis(200));
        assert_eq!(policy.focus_divisor, 1);
    }
}
