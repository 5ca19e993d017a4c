use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use sysinfo::{Pid, ProcessesToUpdate, System};

use super::types::{CycleMetrics, DiagnosticsSnapshot, SystemMetrics};

const MAX_RECENT_CYCLES: usize = 20;

/// Counters and recent cycle timings of the sampling loop.
pub struct LoopDiagnostics {
    inner: Arc<Mutex<DiagnosticsState>>,
}

struct DiagnosticsState {
    recent_cycles: VecDeque<CycleMetrics>,
    frames_processed: u64,
    transient_read_failures: u64,
    unexpected_read_failures: u64,
    frames_without_face: u64,
    estimates_produced: u64,
    blinks_detected: u64,
    system: System,
    pid: Pid,
}

impl LoopDiagnostics {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes, so take the baseline now
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(DiagnosticsState {
                recent_cycles: VecDeque::with_capacity(MAX_RECENT_CYCLES),
                frames_processed: 0,
                transient_read_failures: 0,
                unexpected_read_failures: 0,
                frames_without_face: 0,
                estimates_produced: 0,
                blinks_detected: 0,
                system,
                pid,
            })),
        }
    }

    pub fn record_cycle(&self, metrics: CycleMetrics) {
        let mut state = self.lock();

        state.frames_processed += 1;
        if !metrics.face_found {
            state.frames_without_face += 1;
        }
        if metrics.heart_rate.is_some() {
            state.estimates_produced += 1;
        }
        if metrics.blink {
            state.blinks_detected += 1;
        }

        state.recent_cycles.push_back(metrics);
        if state.recent_cycles.len() > MAX_RECENT_CYCLES {
            state.recent_cycles.pop_front();
        }
    }

    pub fn record_read_failure(&self, transient: bool) {
        let mut state = self.lock();
        if transient {
            state.transient_read_failures += 1;
        } else {
            state.unexpected_read_failures += 1;
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.lock().frames_processed
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut state = self.lock();
        let pid = state.pid;

        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system = state
            .system
            .process(pid)
            .map(|process| SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            })
            .unwrap_or_default();

        DiagnosticsSnapshot {
            system,
            recent_cycles: state.recent_cycles.iter().cloned().collect(),
            frames_processed: state.frames_processed,
            transient_read_failures: state.transient_read_failures,
            unexpected_read_failures: state.unexpected_read_failures,
            frames_without_face: state.frames_without_face,
            estimates_produced: state.estimates_produced,
            blinks_detected: state.blinks_detected,
        }
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        let pid = state.pid;
        state.recent_cycles.clear();
        state.frames_processed = 0;
        state.transient_read_failures = 0;
        state.unexpected_read_failures = 0;
        state.frames_without_face = 0;
        state.estimates_produced = 0;
        state.blinks_detected = 0;
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }

    fn lock(&self) -> MutexGuard<'_, DiagnosticsState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LoopDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LoopDiagnostics {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
