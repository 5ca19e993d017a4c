//! Boundary types for camera frames and face landmarks.
//!
//! Capture and face detection are external collaborators: a [`FrameSource`]
//! opens a camera and yields frames, a [`FaceDetector`] locates at most one
//! face and a fixed set of named landmarks. Everything here is the shape of
//! that boundary plus the green-channel sampler the heart-rate path needs.

pub mod synthetic;

use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// A decoded camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }
}

/// Opens the capture device. Opening is the only fallible step that aborts a
/// monitoring session.
pub trait FrameSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameHandle>, FrameError>;
}

/// An open capture device. The device is released when the handle is dropped.
pub trait FrameHandle: Send {
    /// Read the next frame. Failures here are per-cycle and must leave the
    /// handle usable.
    fn read(&mut self) -> Result<Frame, FrameError>;
}

/// Face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Landmark position in normalized image coordinates (0..1 on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The named landmarks every detector must report for a located face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Landmark {
    LeftEyeTop,
    LeftEyeBottom,
    RightEyeTop,
    RightEyeBottom,
    NoseTip,
}

impl Landmark {
    pub const COUNT: usize = 5;

    pub const ALL: [Landmark; Landmark::COUNT] = [
        Landmark::LeftEyeTop,
        Landmark::LeftEyeBottom,
        Landmark::RightEyeTop,
        Landmark::RightEyeBottom,
        Landmark::NoseTip,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceLandmarks {
    points: [Point2; Landmark::COUNT],
}

impl FaceLandmarks {
    pub fn from_fn(mut point: impl FnMut(Landmark) -> Point2) -> Self {
        let mut points = [Point2::default(); Landmark::COUNT];
        for landmark in Landmark::ALL {
            points[landmark.index()] = point(landmark);
        }
        Self { points }
    }

    pub fn get(&self, landmark: Landmark) -> Point2 {
        self.points[landmark.index()]
    }

    pub fn set(&mut self, landmark: Landmark, point: Point2) {
        self.points[landmark.index()] = point;
    }

    /// The four eye-aperture points, or `None` if any of them is not a finite
    /// coordinate.
    pub fn eyes(&self) -> Option<EyeLandmarks> {
        let eyes = EyeLandmarks {
            left_top: self.get(Landmark::LeftEyeTop).y,
            left_bottom: self.get(Landmark::LeftEyeBottom).y,
            right_top: self.get(Landmark::RightEyeTop).y,
            right_bottom: self.get(Landmark::RightEyeBottom).y,
        };
        let all_finite = [
            eyes.left_top,
            eyes.left_bottom,
            eyes.right_top,
            eyes.right_bottom,
        ]
        .iter()
        .all(|v| v.is_finite());
        all_finite.then_some(eyes)
    }
}

/// Vertical eyelid positions (normalized y) for both eyes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeLandmarks {
    pub left_top: f32,
    pub left_bottom: f32,
    pub right_top: f32,
    pub right_bottom: f32,
}

impl EyeLandmarks {
    /// Mean vertical lid distance across both eyes.
    pub fn aperture_ratio(&self) -> f64 {
        let left = f64::from(self.left_bottom) - f64::from(self.left_top);
        let right = f64::from(self.right_bottom) - f64::from(self.right_top);
        (left + right) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceObservation {
    pub bounds: FaceBox,
    pub landmarks: FaceLandmarks,
}

/// Locates zero or one face in a frame. Detection failures are reported as
/// "no face", never as errors.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Option<FaceObservation>;
}

/// Mean green intensity inside `roi`, or inside the central half of the frame
/// when no face was located. Returns `None` for an empty region.
pub fn green_channel_mean(image: &RgbImage, roi: Option<FaceBox>) -> Option<f64> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let (x0, y0, x1, y1) = match roi {
        Some(face) => {
            let x0 = face.x.min(width);
            let y0 = face.y.min(height);
            (
                x0,
                y0,
                face.x.saturating_add(face.width).min(width),
                face.y.saturating_add(face.height).min(height),
            )
        }
        None => (width / 4, height / 4, 3 * width / 4, 3 * height / 4),
    };

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut sum: u64 = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += u64::from(image.get_pixel(x, y)[1]);
        }
    }
    let count = u64::from(x1 - x0) * u64::from(y1 - y0);
    Some(sum as f64 / count as f64)
}
