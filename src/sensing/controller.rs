use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{FrameError, MonitorError};
use crate::metrics::{LoopDiagnostics, MetricsStore};
use crate::signal::{BlinkConfig, BlinkDetector, RateConfig, RateEstimator};
use crate::vision::{FaceDetector, FrameSource};

use super::config::SamplingConfig;
use super::loop_worker::{sampling_loop, SamplingWorker};
use super::state::LoopStatus;

/// What `start()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A session was already running; nothing changed.
    AlreadyRunning,
}

/// Owns the capture / estimation cycle as a cancelable background task.
///
/// The frame source is opened in `start()` and the resulting handle moves into
/// the task, which drops it (closing the device) when it exits. A task that
/// misses its join deadline is kept as a straggler, and the next `start()`
/// waits for it before opening the source again.
pub struct SamplingLoop {
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn FaceDetector>,
    rate: RateConfig,
    blink: BlinkConfig,
    config: SamplingConfig,
    metrics: MetricsStore,
    diagnostics: LoopDiagnostics,
    status: LoopStatus,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    straggler: Option<JoinHandle<()>>,
}

impl SamplingLoop {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn FaceDetector>,
        rate: RateConfig,
        blink: BlinkConfig,
        config: SamplingConfig,
        metrics: MetricsStore,
    ) -> Self {
        Self {
            source,
            detector,
            rate,
            blink,
            config,
            metrics,
            diagnostics: LoopDiagnostics::new(),
            status: LoopStatus::Idle,
            handle: None,
            cancel_token: None,
            straggler: None,
        }
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn metrics(&self) -> &MetricsStore {
        &self.metrics
    }

    pub fn diagnostics(&self) -> &LoopDiagnostics {
        &self.diagnostics
    }

    /// Whether a previous loop is still winding down after a timed-out stop.
    pub fn has_straggler(&self) -> bool {
        self.straggler
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Open the frame source and spawn the loop. Fails fast, leaving the loop
    /// `Stopped`, if the source cannot be opened. Fails with `StillStopping`
    /// if the previous loop still holds the source after another join window.
    pub async fn start(&mut self, session_id: Uuid) -> Result<StartOutcome, MonitorError> {
        if !self.status.can_start() {
            info!("sampling already active, ignoring start for session {session_id}");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.reap_straggler().await?;

        self.metrics.reset();
        self.diagnostics.reset();

        // Opening a device blocks just like reading from it
        let source = Arc::clone(&self.source);
        let opened = match tokio::task::spawn_blocking(move || source.open()).await {
            Ok(result) => result,
            Err(err) => Err(FrameError::Backend(format!("open task failed: {err}"))),
        };

        let handle = match opened {
            Ok(handle) => handle,
            Err(err) => {
                error!("could not open frame source for session {session_id}: {err}");
                self.status = LoopStatus::Stopped;
                self.metrics.set_running(false);
                return Err(MonitorError::SourceOpen(err));
            }
        };

        let worker = SamplingWorker {
            session_id,
            handle,
            detector: Arc::clone(&self.detector),
            estimator: RateEstimator::new(self.rate.clone()),
            blinks: BlinkDetector::from_config(&self.blink),
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            config: self.config.clone(),
            frames: 0,
            failure_streak: 0,
        };

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        // Frame reads block on the device, so the loop lives on the blocking pool
        let handle = tokio::task::spawn_blocking(move || sampling_loop(worker, token_clone));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.status = LoopStatus::Running;
        self.metrics.set_running(true);
        info!("sampling started for session {session_id}");

        Ok(StartOutcome::Started)
    }

    /// Signal the loop to exit after its current cycle and wait up to the
    /// configured timeout. The loop ends `Stopped` either way; a loop that
    /// misses the deadline still exits (and closes the device) on its next
    /// cancellation check.
    pub async fn stop(&mut self) {
        if self.status != LoopStatus::Running {
            return;
        }
        self.status = LoopStatus::Stopping;

        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(mut handle) = self.handle.take() {
            let timeout = self.config.join_timeout();
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => info!("sampling loop joined"),
                Ok(Err(err)) => error!("sampling loop task failed to join: {err}"),
                Err(_) => {
                    warn!(
                        "sampling loop did not exit within {}ms; leaving it to finish its cycle",
                        timeout.as_millis()
                    );
                    self.straggler = Some(handle);
                }
            }
        }

        self.status = LoopStatus::Stopped;
        self.metrics.set_running(false);
    }

    async fn reap_straggler(&mut self) -> Result<(), MonitorError> {
        let Some(mut handle) = self.straggler.take() else {
            return Ok(());
        };

        let timeout = self.config.join_timeout();
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("previous sampling loop finished");
                Ok(())
            }
            Ok(Err(err)) => {
                error!("previous sampling loop task failed to join: {err}");
                Ok(())
            }
            Err(_) => {
                warn!("previous sampling loop still running; refusing to reopen the source");
                self.straggler = Some(handle);
                Err(MonitorError::StillStopping)
            }
        }
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
