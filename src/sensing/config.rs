use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cadence and shutdown tuning of the sampling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamplingConfig {
    /// Pause between cycles; bounds CPU use without starving frame throughput
    pub cycle_interval_ms: u64,

    /// How long `stop()` waits for the loop to observe cancellation
    pub join_timeout_ms: u64,

    /// Emit a debug status line every n processed frames (0 disables)
    pub status_log_every_frames: u64,
}

impl SamplingConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 10,
            join_timeout_ms: 2000,
            status_log_every_frames: 30,
        }
    }
}
