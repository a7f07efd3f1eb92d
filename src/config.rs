//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hybrid rendering client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// STUN server URL used for the peer connection
    pub stun_server: String,
    /// Interval between connection statistics polls (ms)
    pub stats_interval_ms: u64,
    /// Position delta above which a pose is considered moved (world units)
    pub position_threshold: f64,
    /// Rotation delta above which a pose is considered moved (radians)
    pub rotation_threshold: f64,
    /// Window after connection during which poses are sent unconditionally (ms)
    pub pose_warmup_ms: u64,
    /// Maximum number of pending frames kept for latency correlation
    pub ledger_max_entries: usize,
    /// Maximum age of a pending frame before eviction (ms)
    pub ledger_max_age_ms: u64,
    /// Interpupillary distance reported in status records (meters)
    pub ipd: f64,
    /// Force the dual-camera flag in status records
    pub has_dual_cameras: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stun_server: "stun:stun.l.google.com:19302".to_string(),
            stats_interval_ms: 5000,
            position_threshold: 0.01,
            rotation_threshold: 0.01,
            pose_warmup_ms: 1000,
            ledger_max_entries: 240,
            ledger_max_age_ms: 2000,
            ipd: 0.064,
            has_dual_cameras: false,
        }
    }
}

impl ClientConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn pose_warmup(&self) -> Duration {
        Duration::from_millis(self.pose_warmup_ms)
    }

    pub fn ledger_max_age(&self) -> Duration {
        Duration::from_millis(self.ledger_max_age_ms)
    }
}
