//! Palm detection.

use super::model::{ModelSpec, OnnxModel, TensorLayout};
use super::nms::NonMaxSuppression;
use super::ssd::{Anchors, LayerInfo};
use super::{sigmoid, ModelError};
use crate::frame::{PixelFormat, VideoFrame};
use crate::geometry::{Rect, RotatedRoi};
use anyhow::{anyhow, Result};
use image::{imageops::FilterType, ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;
use tracing::trace;

/// Width and height of the palm detector's input.
pub const PALM_INPUT_SIZE: u32 = 192;

pub(crate) const NUM_PALM_KEYPOINTS: usize = 7;
const NUM_REGRESSORS: usize = 4 + 2 * NUM_PALM_KEYPOINTS;

const KEYPOINT_WRIST: usize = 0;
const KEYPOINT_MIDDLE_FINGER_MCP: usize = 2;

/// Crop size relative to the palm box, and how far the crop is moved towards the fingers.
const ROI_SCALE: f32 = 2.6;
const ROI_SHIFT_Y: f32 = -0.5;

const PALM_LAYERS: &[LayerInfo] = &[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)];

/// A palm found by the palm detector.
///
/// Coordinates are in pixels of whichever image the detection was mapped into.
#[derive(Debug, Clone)]
pub struct PalmDetection {
    pub score: f32,
    pub rect: Rect,
    /// Wrist, index/middle/ring/pinky MCP, thumb CMC, thumb MCP.
    pub keypoints: [(f32, f32); NUM_PALM_KEYPOINTS],
}

impl PalmDetection {
    /// The rotated crop in which the landmark network should look for this hand.
    pub fn roi(&self) -> RotatedRoi {
        let angle = RotatedRoi::angle_between(
            self.keypoints[KEYPOINT_WRIST],
            self.keypoints[KEYPOINT_MIDDLE_FINGER_MCP],
        );
        let (x_center, y_center) = self.rect.center();
        let size = self.rect.width().max(self.rect.height());
        RotatedRoi {
            x_center,
            y_center,
            size,
            angle,
        }
        .shifted(0.0, ROI_SHIFT_Y * self.rect.height())
        .scaled(ROI_SCALE)
    }
}

/// How a frame was fit into the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    ratio: f32,
    x_offset: u32,
    y_offset: u32,
}

impl Letterbox {
    fn new(width: u32, height: u32, target: u32) -> Self {
        let ratio = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_width = ((width as f32 * ratio).round() as u32).clamp(1, target);
        let new_height = ((height as f32 * ratio).round() as u32).clamp(1, target);
        Self {
            ratio,
            x_offset: (target - new_width) / 2,
            y_offset: (target - new_height) / 2,
        }
    }

    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.x_offset as f32) / self.ratio,
            (y - self.y_offset as f32) / self.ratio,
        )
    }
}

pub struct PalmDetector {
    model: OnnxModel,
    anchors: Anchors,
    nms: NonMaxSuppression,
    min_score: f32,
}

impl PalmDetector {
    pub fn new(spec: &ModelSpec, min_score: f32, intra_threads: usize) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load(spec, intra_threads)?,
            anchors: Anchors::calculate(PALM_LAYERS),
            nms: NonMaxSuppression::new(),
            min_score,
        })
    }

    /// Detects palms in an RGB frame. Results are in frame pixels, strongest first.
    pub fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<PalmDetection>> {
        if frame.format != PixelFormat::Rgb {
            return Err(ModelError::UnsupportedFormat(frame.format).into());
        }

        let (padded, letterbox) = letterbox(frame, PALM_INPUT_SIZE)?;
        let input = image_tensor(&padded, self.model.layout());
        let outputs = self.model.run(input)?;
        let [boxes, scores] = outputs.as_slice() else {
            return Err(anyhow!("palm model returned {} outputs, expected 2", outputs.len()));
        };

        let count = self.anchors.anchor_count();
        let boxes = boxes.expect_len("palm regressors", count * NUM_REGRESSORS)?;
        let scores = scores.expect_len("palm scores", count)?;

        let detections = decode(&self.anchors, boxes, scores, PALM_INPUT_SIZE, self.min_score);
        trace!("{} raw palm detections", detections.len());

        Ok(self
            .nms
            .process(detections)
            .into_iter()
            .map(|det| map_detection(det, |x, y| letterbox.to_frame(x, y)))
            .collect())
    }
}

/// Decodes raw regressor/score outputs into detections in network input pixels.
fn decode(
    anchors: &Anchors,
    boxes: &[f32],
    scores: &[f32],
    input_size: u32,
    min_score: f32,
) -> Vec<PalmDetection> {
    let size = input_size as f32;
    let mut out = Vec::new();

    for (index, raw) in scores.iter().enumerate().take(anchors.anchor_count()) {
        let score = sigmoid(*raw);
        if score < min_score {
            continue;
        }

        let anchor = &anchors[index];
        let params = &boxes[index * NUM_REGRESSORS..(index + 1) * NUM_REGRESSORS];
        let ax = anchor.x_center() * size;
        let ay = anchor.y_center() * size;

        let mut keypoints = [(0.0, 0.0); NUM_PALM_KEYPOINTS];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            *kp = (params[4 + 2 * k] + ax, params[5 + 2 * k] + ay);
        }

        out.push(PalmDetection {
            score,
            rect: Rect::from_center(params[0] + ax, params[1] + ay, params[2], params[3]),
            keypoints,
        });
    }

    out
}

fn map_detection(det: PalmDetection, map: impl Fn(f32, f32) -> (f32, f32)) -> PalmDetection {
    let r = det.rect;
    let (x0, y0) = map(r.x(), r.y());
    let (x1, y1) = map(r.x() + r.width(), r.y() + r.height());
    PalmDetection {
        score: det.score,
        rect: Rect::from_corners(x0, y0, x1, y1),
        keypoints: det.keypoints.map(|(x, y)| map(x, y)),
    }
}

/// Scales the frame to fit a `target`×`target` square, padding the rest with black.
fn letterbox(frame: &VideoFrame, target: u32) -> Result<(RgbImage, Letterbox)> {
    let img = ImageBuffer::<Rgb<u8>, _>::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| anyhow!("Failed to create image buffer"))?;

    let letterbox = Letterbox::new(frame.width, frame.height, target);
    let new_width = target - 2 * letterbox.x_offset;
    let new_height = target - 2 * letterbox.y_offset;
    let resized = image::imageops::resize(&img, new_width, new_height, FilterType::Triangle);

    let mut padded = ImageBuffer::from_pixel(target, target, Rgb([0, 0, 0]));
    image::imageops::overlay(
        &mut padded,
        &resized,
        letterbox.x_offset as i64,
        letterbox.y_offset as i64,
    );

    Ok((padded, letterbox))
}

fn image_tensor(img: &RgbImage, layout: TensorLayout) -> Array4<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut tensor = match layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
    };

    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            match layout {
                TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
            }
        }
    }

    tensor
}
