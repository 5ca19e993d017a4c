use std::{sync::Arc, time::Instant};

use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::MonitorError,
    metrics::{DiagnosticsSnapshot, MetricsStore, MonitorState},
    mood::{poller::mood_poll_loop, MoodCategory, MoodChange, MoodEngine, PollSummary},
    sensing::{LoopStatus, SamplingLoop, StartOutcome},
    settings::MonitorSettings,
    vision::{FaceDetector, FrameSource},
};

const MOOD_CHANNEL_CAPACITY: usize = 16;

/// Everything a status reporter needs in one read.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub session_id: Option<Uuid>,
    pub status: LoopStatus,
    pub state: MonitorState,
    pub last_poll: Option<PollSummary>,
}

struct MoodTask {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

struct Session {
    sampling: SamplingLoop,
    mood: Option<MoodTask>,
    session_id: Option<Uuid>,
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.mood.take() {
            task.cancel_token.cancel();
        }
    }
}

/// Session-scoped owner of the sampling loop and the mood poller.
///
/// Clones share the same session. `start()` and `stop()` are serialized, so
/// overlapping lifecycle calls simply queue behind each other.
#[derive(Clone)]
pub struct MonitorController {
    settings: MonitorSettings,
    metrics: MetricsStore,
    session: Arc<Mutex<Session>>,
    mood_tx: broadcast::Sender<MoodChange>,
    summary_tx: Arc<watch::Sender<Option<PollSummary>>>,
}

impl MonitorController {
    pub fn new(
        settings: MonitorSettings,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn FaceDetector>,
    ) -> Result<Self, MonitorError> {
        settings.validate()?;

        let metrics = MetricsStore::new(std::time::Duration::from_secs(settings.blink.window_secs));
        let sampling = SamplingLoop::new(
            source,
            detector,
            settings.rate.clone(),
            settings.blink.clone(),
            settings.sampling.clone(),
            metrics.clone(),
        );
        let (mood_tx, _) = broadcast::channel(MOOD_CHANNEL_CAPACITY);
        let (summary_tx, _) = watch::channel(None);

        Ok(Self {
            settings,
            metrics,
            session: Arc::new(Mutex::new(Session {
                sampling,
                mood: None,
                session_id: None,
            })),
            mood_tx,
            summary_tx: Arc::new(summary_tx),
        })
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Begin a monitoring session. Returns `AlreadyRunning` without touching
    /// anything if one is active; fails with `SourceOpen` if the camera cannot
    /// be opened, in which case nothing keeps running, and with `StillStopping`
    /// if the previous session's loop has not released the camera yet.
    pub async fn start(&self) -> Result<StartOutcome, MonitorError> {
        let mut session = self.session.lock().await;
        let session_id = Uuid::new_v4();

        let outcome = session.sampling.start(session_id).await?;
        if outcome == StartOutcome::AlreadyRunning {
            return Ok(outcome);
        }

        self.summary_tx.send_replace(None);

        let engine = MoodEngine::new(self.settings.mood.clone(), Instant::now());
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(mood_poll_loop(
            engine,
            self.metrics.clone(),
            self.mood_tx.clone(),
            Arc::clone(&self.summary_tx),
            cancel_token.clone(),
        ));

        session.mood = Some(MoodTask {
            handle,
            cancel_token,
        });
        session.session_id = Some(session_id);
        info!("monitoring session {session_id} started");

        Ok(StartOutcome::Started)
    }

    /// End the current session, if any. Safe to call repeatedly.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;

        if let Some(task) = session.mood.take() {
            task.cancel_token.cancel();
            let timeout = self.settings.sampling.join_timeout();
            match tokio::time::timeout(timeout, task.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("mood poller failed to join: {err}"),
                Err(_) => warn!("mood poller did not exit within {}ms", timeout.as_millis()),
            }
        }

        session.sampling.stop().await;

        if let Some(session_id) = session.session_id.take() {
            info!("monitoring session {session_id} stopped");
        }
    }

    pub async fn status(&self) -> LoopStatus {
        self.session.lock().await.sampling.status()
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        self.session.lock().await.session_id
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let session = self.session.lock().await;
        MonitorSnapshot {
            session_id: session.session_id,
            status: session.sampling.status(),
            state: self.metrics.snapshot(),
            last_poll: self.summary_tx.borrow().clone(),
        }
    }

    pub async fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.session.lock().await.sampling.diagnostics().snapshot()
    }

    /// Shared handle to the live readings.
    pub fn metrics(&self) -> MetricsStore {
        self.metrics.clone()
    }

    pub fn get_metrics(&self) -> (f64, f64) {
        self.metrics.get_metrics()
    }

    pub fn get_blink_count(&self) -> u64 {
        self.metrics.get_blink_count()
    }

    pub fn subscribe_moods(&self) -> broadcast::Receiver<MoodChange> {
        self.mood_tx.subscribe()
    }

    pub fn poll_summaries(&self) -> watch::Receiver<Option<PollSummary>> {
        self.summary_tx.subscribe()
    }

    /// Category to use before the first committed switch, e.g. for the music
    /// picked right after `start()`.
    pub fn provisional_mood(&self) -> MoodCategory {
        self.summary_tx
            .borrow()
            .as_ref()
            .map(|summary| summary.provisional)
            .unwrap_or(MoodCategory::DeepFocus)
    }

    /// Another tag from `category`, for topping up a play queue that runs low.
    pub fn refill_tag(&self, category: MoodCategory) -> &'static str {
        category.pick_tag(&mut rand::thread_rng())
    }
}
