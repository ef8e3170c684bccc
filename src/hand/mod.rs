//! Hand detection and landmark estimation.
//!
//! Detection follows the two-stage MediaPipe design: a palm detector locates hands in the full
//! frame, then a landmark network estimates 21 keypoints inside a rotated crop around each palm.
//! Once a hand is found, the crop for the next frame is derived from its landmarks, so the palm
//! detector only needs to run while fewer than the maximum number of hands are tracked.

mod landmark;
mod model;
mod nms;
mod palm;
mod ssd;
mod tracker;

pub use landmark::{LandmarkEstimate, LandmarkModel, LANDMARK_INPUT_SIZE};
pub use model::{ModelSpec, OnnxModel, Tensor, TensorLayout};
pub use palm::{PalmDetection, PalmDetector, PALM_INPUT_SIZE};
pub use tracker::HandTracker;

use crate::frame::VideoFrame;
use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of landmarks the hand landmark network predicts per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Trait for hand detection backends.
pub trait HandDetector {
    /// Detects hands in an RGB frame.
    ///
    /// Landmark coordinates are normalized to the frame's width and height.
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<HandLandmarks>>;
}

/// Errors raised while loading or evaluating the hand models.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found at {0:?}")]
    NotFound(PathBuf),
    #[error("model {model} has no output named {name:?}")]
    MissingOutput { model: String, name: String },
    #[error("unexpected shape for {name}: expected {expected:?} elements, got shape {actual:?}")]
    UnexpectedShape {
        name: String,
        expected: usize,
        actual: Vec<usize>,
    },
    #[error("hand models expect an RGB frame, got {0:?}")]
    UnsupportedFormat(crate::frame::PixelFormat),
}

/// Static configuration of the hand detection pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Maximum number of hands reported per frame
    pub max_num_hands: usize,
    /// Minimum palm detection score for a new hand
    pub min_detection_confidence: f32,
    /// Minimum landmark presence score for a hand to be reported and tracked
    pub min_tracking_confidence: f32,
    /// Run palm detection on every frame instead of tracking
    pub static_image_mode: bool,
    /// Intra-op threads used by ONNX Runtime
    pub intra_threads: usize,
    pub palm_model: ModelSpec,
    pub landmark_model: ModelSpec,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_num_hands: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            static_image_mode: false,
            intra_threads: 4,
            palm_model: ModelSpec::palm_default(),
            landmark_model: ModelSpec::landmark_default(),
        }
    }
}

impl DetectorConfig {
    /// Points both model paths into `dir`, keeping their file names.
    pub fn set_model_dir(&mut self, dir: &Path) {
        for spec in [&mut self.palm_model, &mut self.landmark_model] {
            if let Some(name) = spec.path.file_name() {
                spec.path = dir.join(name);
            }
        }
    }
}

/// Whether a detected hand is a left or right hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// Names for the hand landmarks, in the order the landmark network outputs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Skeletal connections drawn between landmarks.
pub const HAND_CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        // Thumb
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// A single landmark in normalized frame coordinates.
///
/// `x` and `y` are in `[0, 1]` for points inside the frame. `z` is depth relative to the wrist,
/// on roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// The landmarks of one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    landmarks: [Landmark; NUM_LANDMARKS],
    handedness: Handedness,
    score: f32,
}

impl HandLandmarks {
    pub fn new(landmarks: [Landmark; NUM_LANDMARKS]) -> Self {
        Self {
            landmarks,
            handedness: Handedness::Right,
            score: 1.0,
        }
    }

    /// Creates a hand whose landmarks are all placed at one point.
    pub fn at(x: f32, y: f32) -> Self {
        Self::new([Landmark::new(x, y, 0.0); NUM_LANDMARKS])
    }

    pub fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = handedness;
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn landmarks(&self) -> &[Landmark; NUM_LANDMARKS] {
        &self.landmarks
    }

    pub fn landmark(&self, idx: LandmarkIdx) -> Landmark {
        self.landmarks[idx as usize]
    }

    pub fn wrist(&self) -> Landmark {
        self.landmark(LandmarkIdx::Wrist)
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Landmark presence score reported by the landmark network.
    pub fn score(&self) -> f32 {
        self.score
    }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-100.0, 100.0);
    1.0 / (1.0 + (-x).exp())
}
