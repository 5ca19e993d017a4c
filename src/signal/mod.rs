//! Per-frame signal extraction: the rolling sample buffer, the FFT heart-rate
//! estimator and the edge-triggered blink detector.

pub mod blink;
pub mod buffer;
pub mod rate;

pub use blink::{BlinkConfig, BlinkDetector, BlinkEvent};
pub use buffer::{FrameSample, SignalBuffer};
pub use rate::{RateConfig, RateEstimator};
