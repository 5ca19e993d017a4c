//! Camera-based heart rate and blink monitoring with mood classification.
//!
//! A [`MonitorController`] owns one monitoring session at a time: a sampling
//! loop that turns frames into heart rate and blink readings, and a mood
//! poller that averages those readings into a [`MoodCategory`].

pub mod error;
pub mod metrics;
pub mod monitor;
pub mod mood;
pub mod sensing;
pub mod settings;
pub mod signal;
pub mod utils;
pub mod vision;

pub use error::{FrameError, MonitorError};
pub use metrics::{MetricsStore, MonitorState};
pub use monitor::{MonitorController, MonitorSnapshot};
pub use mood::{MoodCategory, MoodChange, MoodConfig, MoodEngine, PollSummary};
pub use sensing::{LoopStatus, SamplingConfig, StartOutcome};
pub use settings::{MonitorSettings, SettingsStore};
pub use signal::{BlinkConfig, BlinkDetector, RateConfig, RateEstimator, SignalBuffer};
pub use vision::{FaceDetector, FrameHandle, FrameSource};
