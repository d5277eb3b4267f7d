//! Runtime configuration for session actors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simulation runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Physics tick interval in milliseconds (default: 1000)
    pub tick_interval_ms: u64,
    /// Telemetry broadcast interval in milliseconds (default: 1000)
    pub telemetry_interval_ms: u64,
    /// Persistence snapshot interval in milliseconds (default: 10000)
    pub snapshot_interval_ms: u64,
    /// Per-session command mailbox depth (default: 64)
    pub mailbox_capacity: usize,
    /// Per-room broadcast buffer (default: 256)
    pub room_capacity: usize,
    /// Seconds the battery may sit at 0% before the session fails (default: 30)
    pub battery_failure_grace_s: f64,
    /// Seconds temperature may sit at a hard limit before the session fails (default: 20)
    pub thermal_failure_grace_s: f64,
    /// Fixed RNG seed for anomaly injection. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            telemetry_interval_ms: 1_000,
            snapshot_interval_ms: 10_000,
            mailbox_capacity: 64,
            room_capacity: 256,
            battery_failure_grace_s: 30.0,
            thermal_failure_grace_s: 20.0,
            rng_seed: None,
        }
    }
}

impl SimConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms.max(1))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.max(1))
    }
}
