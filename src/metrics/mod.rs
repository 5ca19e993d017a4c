mod diagnostics;
mod types;

pub use diagnostics::LoopDiagnostics;
pub use types::{
    BlinkWindow, CycleMetrics, DiagnosticsSnapshot, MonitorState, SystemMetrics,
};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Authoritative current readings of a monitoring session.
///
/// Cloning shares the same store. Every accessor takes one short critical
/// section and never blocks on anything else, so the sampling loop and any
/// number of readers can use it concurrently.
#[derive(Clone)]
pub struct MetricsStore {
    inner: Arc<Mutex<StoreState>>,
}

struct StoreState {
    current: MonitorState,
    blinks: BlinkWindow,
}

impl MetricsStore {
    pub fn new(blink_window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreState {
                current: MonitorState::default(),
                blinks: BlinkWindow::new(blink_window),
            })),
        }
    }

    pub fn update_heart_rate(&self, bpm: f64) {
        self.lock().current.heart_rate = bpm.max(0.0);
    }

    pub fn record_blink(&self) {
        self.record_blink_at(Instant::now());
    }

    pub fn record_blink_at(&self, at: Instant) {
        let mut state = self.lock();
        state.current.blink_count += 1;
        state.current.blinks_per_minute = state.blinks.record(at);
    }

    /// `(heart_rate, blinks_per_minute)`; 0 means no valid reading yet.
    pub fn get_metrics(&self) -> (f64, f64) {
        let state = self.lock();
        (state.current.heart_rate, state.current.blinks_per_minute)
    }

    pub fn get_blink_count(&self) -> u64 {
        self.lock().current.blink_count
    }

    pub fn snapshot(&self) -> MonitorState {
        self.lock().current
    }

    pub fn is_running(&self) -> bool {
        self.lock().current.running
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.lock().current.running = running;
    }

    /// Start a new session from zero readings and an empty blink window.
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        state.current = MonitorState::default();
        state.blinks.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
