use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::vision::EyeLandmarks;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlinkConfig {
    /// Aperture ratio below which the eyes count as closed. Tuned for
    /// normalized landmark coordinates at typical webcam resolution.
    pub closure_threshold: f64,
    /// Trailing span over which blinks per minute are computed.
    pub window_secs: u64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            closure_threshold: 0.012,
            window_secs: 60,
        }
    }
}

/// Onset of an eye closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkEvent {
    pub at: Instant,
}

/// Edge-triggered closure detector: a run of closed frames yields one event,
/// and the detector re-arms only after a frame with the eyes open again.
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    threshold: f64,
    eyes_open: bool,
}

impl BlinkDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            eyes_open: true,
        }
    }

    pub fn from_config(config: &BlinkConfig) -> Self {
        Self::new(config.closure_threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn eyes_open(&self) -> bool {
        self.eyes_open
    }

    /// Process the eye landmarks of a frame that has a face. Frames without a
    /// face must simply not be passed in; they leave the edge state alone.
    pub fn observe(&mut self, eyes: &EyeLandmarks, at: Instant) -> Option<BlinkEvent> {
        self.observe_ratio(eyes.aperture_ratio(), at)
    }

    pub fn observe_ratio(&mut self, ratio: f64, at: Instant) -> Option<BlinkEvent> {
        if ratio < self.threshold {
            if self.eyes_open {
                self.eyes_open = false;
                return Some(BlinkEvent { at });
            }
            None
        } else {
            self.eyes_open = true;
            None
        }
    }
}
