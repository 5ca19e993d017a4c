use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsStore;

use super::engine::{BiometricReading, MoodChange, MoodEngine, PollSummary};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Poll the metrics store on the engine's interval until cancelled, publishing
/// a summary after every poll and a [`MoodChange`] on every committed switch.
pub async fn mood_poll_loop(
    mut engine: MoodEngine,
    metrics: MetricsStore,
    changes: broadcast::Sender<MoodChange>,
    summaries: Arc<watch::Sender<Option<PollSummary>>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(engine.config().poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let state = metrics.snapshot();
                let reading =
                    BiometricReading::new(state.heart_rate, state.blinks_per_minute, Utc::now())
                        .with_blink_count(state.blink_count);
                let outcome = engine.poll(reading, Instant::now().into_std());

                log_debug!(
                    "average metrics - HR: {:.1} BPM, blinks/min: {:.1} over {} readings",
                    outcome.summary.averages.heart_rate,
                    outcome.summary.averages.blinks_per_minute,
                    outcome.summary.history_len
                );

                if let Some(change) = outcome.change {
                    log_info!(
                        "switching to {} ({}) - avg HR {:.1} BPM, avg blinks {:.1}/min",
                        change.category,
                        change.tag,
                        change.averages.heart_rate,
                        change.averages.blinks_per_minute
                    );
                    // No subscribers is fine; the change is still committed
                    let _ = changes.send(change);
                }

                summaries.send_replace(Some(outcome.summary));
            }
            _ = cancel_token.cancelled() => {
                log_info!("mood poller shutting down after {} switches", engine.switches());
                break;
            }
        }
    }
}
