use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    metrics::{CycleMetrics, LoopDiagnostics, MetricsStore},
    signal::{BlinkDetector, FrameSample, RateEstimator},
    vision::{green_channel_mean, FaceDetector, FrameHandle},
};

use super::config::SamplingConfig;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// While reads keep failing, warn on the first failure and then once per this
/// many consecutive failures.
const FAILURE_LOG_EVERY: u64 = 100;

fn logs_failure(streak: u64) -> bool {
    streak == 1 || streak % FAILURE_LOG_EVERY == 0
}

/// Everything one sampling session owns. Dropping it releases the frame
/// handle, so the device is closed however the loop exits.
pub(super) struct SamplingWorker {
    pub(super) session_id: Uuid,
    pub(super) handle: Box<dyn FrameHandle>,
    pub(super) detector: Arc<dyn FaceDetector>,
    pub(super) estimator: RateEstimator,
    pub(super) blinks: BlinkDetector,
    pub(super) metrics: MetricsStore,
    pub(super) diagnostics: LoopDiagnostics,
    pub(super) config: SamplingConfig,
    pub(super) frames: u64,
    /// Consecutive non-transient read failures
    pub(super) failure_streak: u64,
}

/// Result of one pass through the cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum CycleOutcome {
    /// No frame this cycle; the loop simply tries again.
    Skipped,
    Processed {
        heart_rate: Option<f64>,
        blink: bool,
        face_found: bool,
    },
}

pub(super) fn sampling_loop(mut worker: SamplingWorker, cancel_token: CancellationToken) {
    let interval = worker.config.cycle_interval();
    log_info!("sampling loop started for session {}", worker.session_id);

    while !cancel_token.is_cancelled() {
        worker.run_cycle();
        thread::sleep(interval);
    }

    log_info!(
        "sampling loop for session {} shutting down after {} frames",
        worker.session_id,
        worker.frames
    );
}

impl SamplingWorker {
    pub(super) fn run_cycle(&mut self) -> CycleOutcome {
        let cycle_start = Instant::now();

        let frame = match self.handle.read() {
            Ok(frame) => frame,
            Err(err) if err.is_transient() => {
                log_debug!("frame read skipped: {err}");
                self.diagnostics.record_read_failure(true);
                return CycleOutcome::Skipped;
            }
            Err(err) => {
                self.failure_streak += 1;
                if logs_failure(self.failure_streak) {
                    log_warn!(
                        "unexpected frame read failure in session {} ({} in a row): {err}",
                        self.session_id,
                        self.failure_streak
                    );
                }
                self.diagnostics.record_read_failure(false);
                return CycleOutcome::Skipped;
            }
        };
        if self.failure_streak > 0 {
            log_info!(
                "frame reads recovered after {} failures in session {}",
                self.failure_streak,
                self.session_id
            );
            self.failure_streak = 0;
        }
        let read_ms = cycle_start.elapsed().as_millis() as u64;

        let process_start = Instant::now();
        let face = self.detector.detect(&frame);

        let heart_rate = match green_channel_mean(&frame.image, face.as_ref().map(|f| f.bounds)) {
            Some(green) => self
                .estimator
                .observe(FrameSample::new(green, frame.captured_at)),
            None => {
                log_debug!("empty sampling region, skipping heart-rate sample");
                None
            }
        };
        if let Some(bpm) = heart_rate {
            self.metrics.update_heart_rate(bpm);
        }

        let blink = face
            .as_ref()
            .and_then(|f| f.landmarks.eyes())
            .and_then(|eyes| self.blinks.observe(&eyes, frame.captured_at));
        if let Some(event) = blink {
            self.metrics.record_blink_at(event.at);
        }

        self.frames += 1;
        let every = self.config.status_log_every_frames;
        if every > 0 && self.frames % every == 0 {
            let state = self.metrics.snapshot();
            log_debug!(
                "frame {}: HR={:.1} BPM, blinks/min={:.1}, total blinks={}",
                self.frames,
                state.heart_rate,
                state.blinks_per_minute,
                state.blink_count
            );
        }

        let face_found = face.is_some();
        self.diagnostics.record_cycle(CycleMetrics {
            timestamp: Utc::now(),
            read_ms,
            process_ms: process_start.elapsed().as_millis() as u64,
            total_ms: cycle_start.elapsed().as_millis() as u64,
            face_found,
            heart_rate,
            blink: blink.is_some(),
        });

        CycleOutcome::Processed {
            heart_rate,
            blink: blink.is_some(),
            face_found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{BlinkConfig, RateConfig};
    use crate::vision::synthetic::{SyntheticConfig, SyntheticDetector, SyntheticSource};
    use crate::error::FrameError;
    use crate::vision::{FaceBox, FaceLandmarks, FaceObservation, Frame, FrameSource, Landmark, Point2};
    use std::sync::Mutex;
    use std::time::Duration;

    fn worker(source: &SyntheticSource, detector: SyntheticDetector) -> SamplingWorker {
        worker_with(source.open().unwrap(), Arc::new(detector))
    }

    fn worker_with(handle: Box<dyn FrameHandle>, detector: Arc<dyn FaceDetector>) -> SamplingWorker {
        SamplingWorker {
            session_id: Uuid::new_v4(),
            handle,
            detector,
            estimator: RateEstimator::new(RateConfig::default()),
            blinks: BlinkDetector::from_config(&BlinkConfig::default()),
            metrics: MetricsStore::new(Duration::from_secs(60)),
            diagnostics: LoopDiagnostics::new(),
            config: SamplingConfig::default(),
            frames: 0,
            failure_streak: 0,
        }
    }

    /// Sees no face while `eyes` is `None`, otherwise a face whose eyes are
    /// closed when `eyes` holds `true`.
    #[derive(Default)]
    struct ScriptedDetector {
        eyes: Mutex<Option<bool>>,
    }

    impl ScriptedDetector {
        fn set(&self, eyes: Option<bool>) {
            *self.eyes.lock().unwrap() = eyes;
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&self, _frame: &Frame) -> Option<FaceObservation> {
            let closed = (*self.eyes.lock().unwrap())?;
            let gap = if closed { 0.004 } else { 0.025 };
            Some(FaceObservation {
                bounds: FaceBox {
                    x: 16,
                    y: 12,
                    width: 32,
                    height: 24,
                },
                landmarks: FaceLandmarks::from_fn(|landmark| match landmark {
                    Landmark::LeftEyeTop => Point2::new(0.40, 0.40),
                    Landmark::LeftEyeBottom => Point2::new(0.40, 0.40 + gap),
                    Landmark::RightEyeTop => Point2::new(0.60, 0.40),
                    Landmark::RightEyeBottom => Point2::new(0.60, 0.40 + gap),
                    Landmark::NoseTip => Point2::new(0.50, 0.55),
                }),
            })
        }
    }

    /// Fails with a disconnect for the first `failures` reads, then delegates.
    struct DroppingHandle {
        failures: u64,
        inner: Box<dyn FrameHandle>,
    }

    impl FrameHandle for DroppingHandle {
        fn read(&mut self) -> Result<Frame, FrameError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(FrameError::Disconnected("camera 0".into()));
            }
            self.inner.read()
        }
    }

    fn unpaced(config: SyntheticConfig) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            paced: false,
            ..config
        })
    }

    #[test]
    fn heart_rate_appears_once_buffer_fills() {
        let source = unpaced(SyntheticConfig {
            blink_every: None,
            ..SyntheticConfig::default()
        });
        let mut worker = worker(&source, SyntheticDetector::default());

        for _ in 0..149 {
            worker.run_cycle();
        }
        assert_eq!(worker.metrics.get_metrics().0, 0.0);

        worker.run_cycle();
        let (hr, _) = worker.metrics.get_metrics();
        assert!((hr - 72.0).abs() <= 2.0, "got {hr}");
    }

    #[test]
    fn multi_frame_closures_count_once() {
        let source = unpaced(SyntheticConfig {
            blink_every: Some(Duration::from_secs(1)),
            blink_frames: 5,
            ..SyntheticConfig::default()
        });
        let mut worker = worker(&source, SyntheticDetector::default());

        // Frames 0..=119 cover blink onsets at frames 30, 60 and 90
        for _ in 0..120 {
            worker.run_cycle();
        }
        assert_eq!(worker.metrics.get_blink_count(), 3);
        let (_, per_minute) = worker.metrics.get_metrics();
        // Three onsets spanning two seconds
        assert!((per_minute - 90.0).abs() < 1e-6, "got {per_minute}");
    }

    #[test]
    fn no_face_still_estimates_heart_rate_but_never_blinks() {
        let source = unpaced(SyntheticConfig {
            blink_every: Some(Duration::from_secs(1)),
            ..SyntheticConfig::default()
        });
        let mut worker = worker(&source, SyntheticDetector { blind: true });

        let outcomes: Vec<CycleOutcome> = (0..150).map(|_| worker.run_cycle()).collect();
        assert!(outcomes.iter().all(|o| matches!(
            o,
            CycleOutcome::Processed { face_found: false, blink: false, .. }
        )));
        assert_eq!(worker.metrics.get_blink_count(), 0);
        assert!(worker.metrics.get_metrics().0 > 0.0);
        assert!(worker.blinks.eyes_open());
    }

    #[test]
    fn faceless_frames_do_not_rearm_a_closed_eye() {
        let source = unpaced(SyntheticConfig {
            blink_every: None,
            ..SyntheticConfig::default()
        });
        let detector = Arc::new(ScriptedDetector::default());
        let mut worker = worker_with(source.open().unwrap(), detector.clone());

        detector.set(Some(true));
        for _ in 0..5 {
            worker.run_cycle();
        }
        assert_eq!(worker.metrics.get_blink_count(), 1);

        detector.set(None);
        for _ in 0..5 {
            worker.run_cycle();
        }
        assert!(!worker.blinks.eyes_open());

        // Still the same closure once the face comes back
        detector.set(Some(true));
        for _ in 0..5 {
            worker.run_cycle();
        }
        assert_eq!(worker.metrics.get_blink_count(), 1);

        detector.set(Some(false));
        worker.run_cycle();
        detector.set(Some(true));
        worker.run_cycle();
        assert_eq!(worker.metrics.get_blink_count(), 2);
    }

    #[test]
    fn persistent_failures_are_counted_but_logged_sparsely() {
        let logged = (1..=250).filter(|&streak| logs_failure(streak)).count();
        assert_eq!(logged, 3);

        let source = unpaced(SyntheticConfig::default());
        let handle = Box::new(DroppingHandle {
            failures: 250,
            inner: source.open().unwrap(),
        });
        let mut worker = worker_with(handle, Arc::new(SyntheticDetector::default()));

        for _ in 0..250 {
            assert_eq!(worker.run_cycle(), CycleOutcome::Skipped);
        }
        assert_eq!(worker.failure_streak, 250);
        assert_eq!(worker.diagnostics.snapshot().unexpected_read_failures, 250);

        assert!(matches!(worker.run_cycle(), CycleOutcome::Processed { .. }));
        assert_eq!(worker.failure_streak, 0);
    }

    #[test]
    fn read_failures_skip_the_cycle() {
        let source = unpaced(SyntheticConfig {
            fail_every: Some(2),
            ..SyntheticConfig::default()
        });
        let mut worker = worker(&source, SyntheticDetector::default());

        assert!(matches!(worker.run_cycle(), CycleOutcome::Processed { .. }));
        assert_eq!(worker.run_cycle(), CycleOutcome::Skipped);
        assert!(matches!(worker.run_cycle(), CycleOutcome::Processed { .. }));

        let snapshot = worker.diagnostics.snapshot();
        assert_eq!(snapshot.frames_processed, 2);
        assert_eq!(snapshot.transient_read_failures, 1);
    }

    #[test]
    fn cancelled_loop_exits_and_releases_handle() {
        let source = unpaced(SyntheticConfig::default());
        let worker = worker(&source, SyntheticDetector::default());
        let token = CancellationToken::new();
        token.cancel();

        sampling_loop(worker, token);
        assert_eq!(source.open_handles(), 0);
    }
}
