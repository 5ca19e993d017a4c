use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest span used when turning a blink count into a rate.
const MIN_SPAN_SECS: f64 = 1e-6;

/// Latest readings of a monitoring session. Handed out by value, so a reader
/// always sees one consistent copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    pub heart_rate: f64,
    pub blinks_per_minute: f64,
    pub blink_count: u64,
    pub running: bool,
}

/// Blink onsets inside a trailing time span, oldest first.
#[derive(Debug, Clone)]
pub struct BlinkWindow {
    events: VecDeque<Instant>,
    span: Duration,
}

impl BlinkWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            events: VecDeque::new(),
            span,
        }
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Record a blink at `at` and return the refreshed blinks-per-minute.
    pub fn record(&mut self, at: Instant) -> f64 {
        self.events.push_back(at);
        self.rate_at(at)
    }

    /// Drop events older than the span and compute the rate over what is left.
    /// A single retained event has no measurable span and yields 0.
    pub fn rate_at(&mut self, now: Instant) -> f64 {
        self.trim(now);

        let count = self.events.len();
        if count < 2 {
            return 0.0;
        }
        let Some(oldest) = self.events.front() else {
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(*oldest).as_secs_f64();
        count as f64 / elapsed.max(MIN_SPAN_SECS) * 60.0
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn trim(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.span) else {
            return;
        };
        while let Some(front) = self.events.front() {
            if *front < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Timing and outcome of a single sampling cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleMetrics {
    pub timestamp: DateTime<Utc>,
    pub read_ms: u64,
    pub process_ms: u64,
    pub total_ms: u64,
    pub face_found: bool,
    pub heart_rate: Option<f64>,
    pub blink: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub system: SystemMetrics,
    pub recent_cycles: Vec<CycleMetrics>,
    pub frames_processed: u64,
    pub transient_read_failures: u64,
    pub unexpected_read_failures: u64,
    pub frames_without_face: u64,
    pub estimates_produced: u64,
    pub blinks_detected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_over_retained_span() {
        let t0 = Instant::now();
        let mut window = BlinkWindow::new(Duration::from_secs(60));
        assert_eq!(window.record(t0), 0.0);
        window.record(t0 + Duration::from_secs(10));
        let rate = window.record(t0 + Duration::from_secs(20));
        assert!((rate - 9.0).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn long_gap_resets_then_stabilises() {
        let t0 = Instant::now();
        let mut window = BlinkWindow::new(Duration::from_secs(60));
        for secs in [0, 5, 10, 15] {
            window.record(t0 + Duration::from_secs(secs));
        }
        assert_eq!(window.len(), 4);

        assert_eq!(window.record(t0 + Duration::from_secs(200)), 0.0);
        assert_eq!(window.len(), 1);

        let rate = window.record(t0 + Duration::from_secs(205));
        assert!((rate - 24.0).abs() < 1e-9, "got {rate}");
        let rate = window.record(t0 + Duration::from_secs(210));
        assert!((rate - 18.0).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn events_older_than_window_are_excluded() {
        let t0 = Instant::now();
        let mut window = BlinkWindow::new(Duration::from_secs(60));
        window.record(t0);
        window.record(t0 + Duration::from_secs(30));
        window.record(t0 + Duration::from_secs(50));
        // t0 falls out at 70 s; 30, 50 and 70 remain over a 40 s span
        let rate = window.record(t0 + Duration::from_secs(70));
        assert_eq!(window.len(), 3);
        assert!((rate - 4.5).abs() < 1e-9, "got {rate}");
    }
}
