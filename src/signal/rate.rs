//! Heart-rate estimation from the green-channel intensity of facial skin.
//!
//! Blood volume changes modulate how much green light the skin reflects. Over a
//! few seconds of video that modulation shows up as a spectral peak at the
//! pulse frequency:
//! 1. Buffer the most recent `buffer_size` green means
//! 2. Subtract the buffer mean (illumination / DC offset)
//! 3. FFT over the whole buffer, resolution `sample_rate / buffer_size`
//! 4. Pick the strongest bin inside the physiological band
//! 5. Accept the resulting bpm only inside the plausible range

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::buffer::{FrameSample, SignalBuffer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateConfig {
    /// Nominal capture rate in Hz
    pub sample_rate_hz: f64,
    /// Samples per estimate (150 = 5 s at 30 fps)
    pub buffer_size: usize,
    /// Never estimate from fewer samples than this, whatever the buffer size
    pub min_samples: usize,
    /// Lower edge of the searched band (0.8 Hz = 48 bpm)
    pub band_min_hz: f64,
    /// Upper edge of the searched band (3.0 Hz = 180 bpm)
    pub band_max_hz: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30.0,
            buffer_size: 150,
            min_samples: 60,
            band_min_hz: 0.8,
            band_max_hz: 3.0,
            min_bpm: 45.0,
            max_bpm: 180.0,
        }
    }
}

pub struct RateEstimator {
    config: RateConfig,
    buffer: SignalBuffer,
    /// Forward plan for `buffer_size`, planned once
    fft: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex64>,
}

impl RateEstimator {
    pub fn new(config: RateConfig) -> Self {
        let size = config.buffer_size.max(1);
        let fft = FftPlanner::new().plan_fft_forward(size);
        Self {
            buffer: SignalBuffer::new(size),
            spectrum: Vec::with_capacity(size),
            fft,
            config,
        }
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Samples currently buffered
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Feed one frame's sample. Returns a heart rate in bpm once the buffer is
    /// full and the spectrum yields a plausible peak, `None` otherwise.
    pub fn observe(&mut self, sample: FrameSample) -> Option<f64> {
        self.buffer.push(sample);

        if !self.buffer.is_full() || self.buffer.len() < self.config.min_samples {
            return None;
        }

        self.estimate()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn estimate(&mut self) -> Option<f64> {
        let mean = self.buffer.mean()?;
        let n = self.buffer.len();

        self.spectrum.clear();
        self.spectrum
            .extend(self.buffer.values().map(|v| Complex64::new(v - mean, 0.0)));
        self.fft.process(&mut self.spectrum);

        let fs = self.config.sample_rate_hz;
        let bin_hz = |k: usize| k as f64 * fs / n as f64;

        // Strictly positive frequencies only; for even n the Nyquist bin
        // belongs to the negative half.
        let mut peak: Option<(usize, f64)> = None;
        for k in 1..=(n - 1) / 2 {
            let freq = bin_hz(k);
            if freq < self.config.band_min_hz || freq > self.config.band_max_hz {
                continue;
            }
            let magnitude = self.spectrum[k].norm();
            match peak {
                Some((_, best)) if magnitude <= best => {}
                _ => peak = Some((k, magnitude)),
            }
        }

        let (peak_bin, _) = peak?;
        let bpm = bin_hz(peak_bin) * 60.0;

        (self.config.min_bpm..=self.config.max_bpm)
            .contains(&bpm)
            .then_some(bpm)
    }
}
