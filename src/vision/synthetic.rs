//! Deterministic stand-ins for the camera and the face detector.
//!
//! The synthetic source renders a flat frame whose green level follows a
//! sinusoidal pulse, and marks eye-closure frames through the red channel of
//! the top-left pixel. [`SyntheticDetector`] reads that marker back, so the
//! pair exercises the full sampling path without a camera.

use std::f64::consts::PI;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use crate::error::FrameError;

use super::{
    FaceBox, FaceDetector, FaceLandmarks, FaceObservation, Frame, FrameHandle, FrameSource,
    Landmark, Point2,
};

const CLOSED_MARKER: u8 = 255;
const OPEN_LID_GAP: f32 = 0.025;
const CLOSED_LID_GAP: f32 = 0.004;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pulse_hz: f64,
    pub base_level: f64,
    pub amplitude: f64,
    /// Interval between blink onsets; `None` disables blinking.
    pub blink_every: Option<Duration>,
    /// Consecutive frames the eyes stay closed per blink.
    pub blink_frames: u64,
    /// Every n-th read fails with [`FrameError::Unavailable`].
    pub fail_every: Option<u64>,
    /// Make `open()` fail with this error.
    pub open_error: Option<FrameError>,
    /// Block in `read()` until the frame's capture time, like a real camera.
    pub paced: bool,
    /// Extra blocking delay on every `read()`, like a stalled device.
    pub read_delay: Option<Duration>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            fps: 30.0,
            pulse_hz: 1.2,
            base_level: 120.0,
            amplitude: 4.0,
            blink_every: Some(Duration::from_secs(4)),
            blink_frames: 4,
            fail_every: None,
            open_error: None,
            paced: true,
            read_delay: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    open_handles: Arc<AtomicUsize>,
    total_opens: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            open_handles: Arc::new(AtomicUsize::new(0)),
            total_opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handles currently open (not yet dropped).
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }
}

impl FrameSource for SyntheticSource {
    fn open(&self) -> Result<Box<dyn FrameHandle>, FrameError> {
        if let Some(err) = &self.config.open_error {
            return Err(err.clone());
        }

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        self.total_opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticHandle {
            config: self.config.clone(),
            open_handles: Arc::clone(&self.open_handles),
            started_at: Instant::now(),
            reads: 0,
            frame_index: 0,
        }))
    }
}

struct SyntheticHandle {
    config: SyntheticConfig,
    open_handles: Arc<AtomicUsize>,
    started_at: Instant,
    reads: u64,
    frame_index: u64,
}

impl SyntheticHandle {
    fn eyes_closed(&self, frame_index: u64) -> bool {
        let Some(every) = self.config.blink_every else {
            return false;
        };
        let frames_per_blink = (every.as_secs_f64() * self.config.fps).round() as u64;
        if frames_per_blink == 0 {
            return false;
        }
        // The first blink lands one full period in, once the signal is flowing.
        frame_index >= frames_per_blink && frame_index % frames_per_blink < self.config.blink_frames
    }
}

impl FrameHandle for SyntheticHandle {
    fn read(&mut self) -> Result<Frame, FrameError> {
        if let Some(delay) = self.config.read_delay {
            thread::sleep(delay);
        }

        self.reads += 1;
        if let Some(n) = self.config.fail_every {
            if n > 0 && self.reads % n == 0 {
                return Err(FrameError::Unavailable);
            }
        }

        let index = self.frame_index;
        let elapsed = index as f64 / self.config.fps;
        let captured_at = self.started_at + Duration::from_secs_f64(elapsed);
        self.frame_index += 1;

        if self.config.paced {
            let now = Instant::now();
            if captured_at > now {
                thread::sleep(captured_at - now);
            }
        }

        let level = self.config.base_level
            + self.config.amplitude * (2.0 * PI * self.config.pulse_hz * elapsed).sin();
        let green = level.round().clamp(0.0, 255.0) as u8;

        let mut image =
            RgbImage::from_pixel(self.config.width, self.config.height, Rgb([90, green, 70]));
        if self.eyes_closed(index) {
            image.put_pixel(0, 0, Rgb([CLOSED_MARKER, green, 70]));
        }

        Ok(Frame::new(image, captured_at))
    }
}

impl Drop for SyntheticHandle {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reports a centered face on every frame, with the lids closed whenever the
/// synthetic source marked the frame.
#[derive(Debug, Clone, Default)]
pub struct SyntheticDetector {
    /// Report "no face" for every frame.
    pub blind: bool,
}

impl FaceDetector for SyntheticDetector {
    fn detect(&self, frame: &Frame) -> Option<FaceObservation> {
        if self.blind {
            return None;
        }

        let (width, height) = frame.image.dimensions();
        if width < 4 || height < 4 {
            return None;
        }

        let closed = frame.image.get_pixel(0, 0)[0] == CLOSED_MARKER;
        let gap = if closed { CLOSED_LID_GAP } else { OPEN_LID_GAP };

        let landmarks = FaceLandmarks::from_fn(|landmark| match landmark {
            Landmark::LeftEyeTop => Point2::new(0.40, 0.40),
            Landmark::LeftEyeBottom => Point2::new(0.40, 0.40 + gap),
            Landmark::RightEyeTop => Point2::new(0.60, 0.40),
            Landmark::RightEyeBottom => Point2::new(0.60, 0.40 + gap),
            Landmark::NoseTip => Point2::new(0.50, 0.55),
        });

        Some(FaceObservation {
            bounds: FaceBox {
                x: width / 4,
                y: height / 4,
                width: width / 2,
                height: height / 2,
            },
            landmarks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpaced() -> SyntheticConfig {
        SyntheticConfig {
            paced: false,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn handles_are_counted_until_dropped() {
        let source = SyntheticSource::new(unpaced());
        let handle = source.open().unwrap();
        assert_eq!(source.open_handles(), 1);
        drop(handle);
        assert_eq!(source.open_handles(), 0);
        assert_eq!(source.total_opens(), 1);
    }

    #[test]
    fn open_error_is_reported() {
        let source = SyntheticSource::new(SyntheticConfig {
            open_error: Some(FrameError::Disconnected("no camera".into())),
            ..unpaced()
        });
        assert!(source.open().is_err());
        assert_eq!(source.open_handles(), 0);
    }

    #[test]
    fn injected_read_failures() {
        let source = SyntheticSource::new(SyntheticConfig {
            fail_every: Some(3),
            ..unpaced()
        });
        let mut handle = source.open().unwrap();
        assert!(handle.read().is_ok());
        assert!(handle.read().is_ok());
        assert_eq!(handle.read().unwrap_err(), FrameError::Unavailable);
        assert!(handle.read().is_ok());
    }

    #[test]
    fn detector_sees_marked_blinks() {
        let source = SyntheticSource::new(SyntheticConfig {
            blink_every: Some(Duration::from_secs(1)),
            blink_frames: 3,
            ..unpaced()
        });
        let detector = SyntheticDetector::default();
        let mut handle = source.open().unwrap();

        let ratios: Vec<f64> = (0..60)
            .map(|_| {
                let frame = handle.read().unwrap();
                let face = detector.detect(&frame).unwrap();
                face.landmarks.eyes().unwrap().aperture_ratio()
            })
            .collect();

        let closed: Vec<usize> = ratios
            .iter()
            .enumerate()
            .filter(|(_, r)| **r < 0.012)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(closed, vec![30, 31, 32]);
    }
}
