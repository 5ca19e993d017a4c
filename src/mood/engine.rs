use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::category::{MoodCategory, MoodThresholds};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MoodConfig {
    pub poll_interval_ms: u64,
    /// Readings kept for averaging
    pub history_capacity: usize,
    /// Minimum time between committed switches. Matches the playback length
    /// of one preview track plus a short buffer.
    pub dwell_secs: u64,
    pub thresholds: MoodThresholds,
}

impl MoodConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_secs)
    }
}

impl Default for MoodConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            history_capacity: 10,
            dwell_secs: 32,
            thresholds: MoodThresholds::default(),
        }
    }
}

/// One poll of the metrics store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricReading {
    pub heart_rate: f64,
    pub blinks_per_minute: f64,
    /// Session blink total at the time of the poll
    #[serde(default)]
    pub blink_count: u64,
    pub timestamp: DateTime<Utc>,
}

impl BiometricReading {
    pub fn new(heart_rate: f64, blinks_per_minute: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            heart_rate: heart_rate.max(0.0),
            blinks_per_minute: blinks_per_minute.max(0.0),
            blink_count: 0,
            timestamp,
        }
    }

    pub fn with_blink_count(mut self, blink_count: u64) -> Self {
        self.blink_count = blink_count;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Averages {
    pub heart_rate: f64,
    pub blinks_per_minute: f64,
}

/// Committed category switch, published to the music / UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodChange {
    pub category: MoodCategory,
    pub previous: Option<MoodCategory>,
    pub tag: String,
    pub averages: Averages,
    pub at: DateTime<Utc>,
}

/// State after every poll, for status reporters. `reading` carries the raw
/// heart rate, blink rate and blink total of this poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub reading: BiometricReading,
    pub averages: Averages,
    pub history_len: usize,
    pub current: Option<MoodCategory>,
    pub provisional: MoodCategory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub summary: PollSummary,
    pub change: Option<MoodChange>,
}

/// Averages recent readings and switches category at most once per dwell
/// period.
///
/// Between switches readings keep accumulating (up to the history capacity)
/// but nothing is emitted, however the instantaneous classification moves.
/// A committed switch clears the history so the next decision rests on fresh
/// readings only.
pub struct MoodEngine {
    config: MoodConfig,
    history: VecDeque<BiometricReading>,
    current: Option<MoodCategory>,
    last_switch: Instant,
    switches: u64,
    rng: StdRng,
}

impl MoodEngine {
    pub fn new(config: MoodConfig, started_at: Instant) -> Self {
        Self::with_rng(config, started_at, StdRng::from_entropy())
    }

    pub fn with_rng(config: MoodConfig, started_at: Instant, rng: StdRng) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            config,
            current: None,
            last_switch: started_at,
            switches: 0,
            rng,
        }
    }

    pub fn config(&self) -> &MoodConfig {
        &self.config
    }

    pub fn current(&self) -> Option<MoodCategory> {
        self.current
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Committed switches so far.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    pub fn averages(&self) -> Option<Averages> {
        if self.history.is_empty() {
            return None;
        }
        let n = self.history.len() as f64;
        Some(Averages {
            heart_rate: self.history.iter().map(|r| r.heart_rate).sum::<f64>() / n,
            blinks_per_minute: self.history.iter().map(|r| r.blinks_per_minute).sum::<f64>() / n,
        })
    }

    /// The category to act on right now: the committed one if any, else what
    /// the current averages suggest, else deep focus.
    pub fn provisional(&self) -> MoodCategory {
        self.current
            .or_else(|| {
                self.averages().map(|avg| {
                    MoodCategory::classify(
                        avg.heart_rate,
                        avg.blinks_per_minute,
                        &self.config.thresholds,
                    )
                })
            })
            .unwrap_or(MoodCategory::DeepFocus)
    }

    pub fn pick_tag(&mut self, category: MoodCategory) -> &'static str {
        category.pick_tag(&mut self.rng)
    }

    pub fn poll(&mut self, reading: BiometricReading, now: Instant) -> PollOutcome {
        let capacity = self.config.history_capacity.max(1);
        self.history.push_back(reading);
        while self.history.len() > capacity {
            self.history.pop_front();
        }

        let averages = self.averages().unwrap_or(Averages {
            heart_rate: reading.heart_rate,
            blinks_per_minute: reading.blinks_per_minute,
        });

        let change = if now.saturating_duration_since(self.last_switch) >= self.config.dwell() {
            Some(self.commit(averages, reading.timestamp, now))
        } else {
            None
        };

        PollOutcome {
            summary: PollSummary {
                reading,
                averages,
                history_len: self.history.len(),
                current: self.current,
                provisional: self.provisional(),
            },
            change,
        }
    }

    fn commit(&mut self, averages: Averages, at: DateTime<Utc>, now: Instant) -> MoodChange {
        let category = MoodCategory::classify(
            averages.heart_rate,
            averages.blinks_per_minute,
            &self.config.thresholds,
        );
        let tag = self.pick_tag(category).to_string();
        let previous = self.current.replace(category);

        self.last_switch = now;
        self.history.clear();
        self.switches += 1;

        MoodChange {
            category,
            previous,
            tag,
            averages,
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_secs(2);

    fn engine(t0: Instant) -> MoodEngine {
        MoodEngine::with_rng(MoodConfig::default(), t0, StdRng::seed_from_u64(42))
    }

    fn reading(hr: f64, blinks: f64) -> BiometricReading {
        BiometricReading::new(hr, blinks, Utc::now())
    }

    #[test]
    fn history_is_capped() {
        let t0 = Instant::now();
        let mut engine = engine(t0);
        for i in 0..12 {
            engine.poll(reading(60.0 + i as f64, 10.0), t0 + POLL * i);
        }
        assert_eq!(engine.history_len(), 10);
        // Readings 62..=71 remain
        let avg = engine.averages().unwrap();
        assert!((avg.heart_rate - 66.5).abs() < 1e-9);
    }

    #[test]
    fn no_switch_before_dwell_elapses() {
        let t0 = Instant::now();
        let mut engine = engine(t0);

        // Calm start, then clearly stressed readings well before 32 s
        for i in 1..=5 {
            let outcome = engine.poll(reading(70.0, 15.0), t0 + POLL * i);
            assert!(outcome.change.is_none());
        }
        for i in 6..=15 {
            let outcome = engine.poll(reading(120.0, 30.0), t0 + POLL * i);
            assert!(outcome.change.is_none(), "switched at poll {i}");
        }
        // The window is all stressed readings by now, yet nothing was committed
        assert_eq!(engine.provisional(), MoodCategory::HighStress);
        assert_eq!(engine.current(), None);
        assert_eq!(engine.switches(), 0);
    }

    #[test]
    fn switch_commits_once_dwell_elapses_and_clears_history() {
        let t0 = Instant::now();
        let mut engine = engine(t0);

        for i in 1..=15 {
            engine.poll(reading(40.0, 5.0), t0 + POLL * i);
        }
        assert_eq!(engine.history_len(), 10);

        let outcome = engine.poll(reading(40.0, 5.0), t0 + POLL * 16);
        let change = outcome.change.expect("dwell elapsed at 32 s");
        assert_eq!(change.category, MoodCategory::LowEnergy);
        assert_eq!(change.previous, None);
        assert!(MoodCategory::LowEnergy.tags().contains(&change.tag.as_str()));
        assert_eq!(change.averages.heart_rate, 40.0);
        assert_eq!(engine.history_len(), 0);
        assert_eq!(outcome.summary.history_len, 0);
        assert_eq!(engine.current(), Some(MoodCategory::LowEnergy));
        assert_eq!(engine.switches(), 1);

        // Dwell restarts from the switch
        let outcome = engine.poll(reading(120.0, 30.0), t0 + POLL * 17);
        assert!(outcome.change.is_none());
        assert_eq!(engine.history_len(), 1);
        assert_eq!(engine.switches(), 1);
    }

    #[test]
    fn next_switch_uses_only_fresh_readings() {
        let t0 = Instant::now();
        let mut engine = engine(t0);

        let first = engine.poll(reading(40.0, 5.0), t0 + Duration::from_secs(32));
        assert_eq!(first.change.unwrap().category, MoodCategory::LowEnergy);

        for i in 1..16 {
            engine.poll(reading(110.0, 25.0), t0 + Duration::from_secs(32) + POLL * i);
        }
        let second = engine
            .poll(reading(110.0, 25.0), t0 + Duration::from_secs(64))
            .change
            .expect("second dwell elapsed");
        assert_eq!(second.category, MoodCategory::HighStress);
        assert_eq!(second.previous, Some(MoodCategory::LowEnergy));
        assert_eq!(second.averages.heart_rate, 110.0);
        assert_eq!(engine.switches(), 2);
    }

    #[test]
    fn provisional_defaults_to_deep_focus() {
        let engine = engine(Instant::now());
        assert_eq!(engine.provisional(), MoodCategory::DeepFocus);
        assert_eq!(engine.averages(), None);
    }

    #[test]
    fn seeded_engines_pick_the_same_tags() {
        let t0 = Instant::now();
        let mut a = engine(t0);
        let mut b = engine(t0);
        let tags_a: Vec<_> = (0..10).map(|_| a.pick_tag(MoodCategory::LowEnergy)).collect();
        let tags_b: Vec<_> = (0..10).map(|_| b.pick_tag(MoodCategory::LowEnergy)).collect();
        assert_eq!(tags_a, tags_b);
    }
}
