use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock};

use crate::error::MonitorError;
use crate::mood::MoodConfig;
use crate::sensing::SamplingConfig;
use crate::signal::{BlinkConfig, RateConfig};

const BLINK_THRESHOLD_ENV: &str = "BIOMOOD_BLINK_THRESHOLD";
const DWELL_SECS_ENV: &str = "BIOMOOD_DWELL_SECS";
const DEBUG_ENV: &str = "BIOMOOD_DEBUG";

/// Every tunable of a monitoring session. The eye-closure threshold and the
/// mood dwell period depend on the camera setup and on the playback cadence of
/// whatever consumes mood changes, so both live here rather than in code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub rate: RateConfig,
    pub blink: BlinkConfig,
    pub sampling: SamplingConfig,
    pub mood: MoodConfig,
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), MonitorError> {
        let invalid = |msg: &str| Err(MonitorError::InvalidSettings(msg.to_string()));

        if !(self.rate.sample_rate_hz > 0.0) {
            return invalid("rate.sample_rate_hz must be positive");
        }
        if self.rate.buffer_size == 0 {
            return invalid("rate.buffer_size must be non-zero");
        }
        if !(self.rate.band_min_hz < self.rate.band_max_hz) {
            return invalid("rate.band_min_hz must be below rate.band_max_hz");
        }
        if !(self.rate.min_bpm < self.rate.max_bpm) {
            return invalid("rate.min_bpm must be below rate.max_bpm");
        }
        if !(self.blink.closure_threshold > 0.0) {
            return invalid("blink.closure_threshold must be positive");
        }
        if self.blink.window_secs == 0 {
            return invalid("blink.window_secs must be non-zero");
        }
        if self.sampling.join_timeout_ms == 0 {
            return invalid("sampling.join_timeout_ms must be non-zero");
        }
        if self.mood.history_capacity == 0 {
            return invalid("mood.history_capacity must be non-zero");
        }
        if self.mood.poll_interval_ms == 0 {
            return invalid("mood.poll_interval_ms must be non-zero");
        }
        Ok(())
    }

    /// Apply `BIOMOOD_*` environment overrides on top of these settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(threshold) = parse_env::<f64>(BLINK_THRESHOLD_ENV) {
            self.blink.closure_threshold = threshold;
        }
        if let Some(dwell) = parse_env::<u64>(DWELL_SECS_ENV) {
            self.mood.dwell_secs = dwell;
        }

        let debug_mode = env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.sampling.status_log_every_frames = 1;
        }

        self
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(
                        "Malformed settings in {}, falling back to defaults: {err}",
                        path.display()
                    );
                    MonitorSettings::default()
                }
            }
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> MonitorSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update(&self, settings: MonitorSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
