//! Mood classification from windowed biometric averages.

pub mod category;
pub mod engine;
pub mod poller;

pub use category::{MoodCategory, MoodThresholds};
pub use engine::{
    Averages, BiometricReading, MoodChange, MoodConfig, MoodEngine, PollOutcome, PollSummary,
};
