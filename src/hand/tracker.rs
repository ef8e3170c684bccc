//! Palm detection + landmark tracking across frames.

use super::landmark::{LandmarkEstimate, LandmarkModel};
use super::palm::PalmDetector;
use super::{
    DetectorConfig, HandDetector, HandLandmarks, Handedness, Landmark, LandmarkIdx, NUM_LANDMARKS,
};
use crate::frame::VideoFrame;
use crate::geometry::{Rect, RotatedRoi};
use anyhow::{Context, Result};
use tracing::{debug, info, trace};

/// Crop size relative to the landmark bounding box, and its shift towards the fingers.
const TRACKING_ROI_SCALE: f32 = 2.0;
const TRACKING_ROI_SHIFT_Y: f32 = -0.1;

/// A newly detected palm is ignored if its crop overlaps a tracked crop by more than this.
const TRACKED_OVERLAP_IOU: f32 = 0.5;

/// Landmarks used to estimate the crop for the next frame.
const PALM_LANDMARKS: &[LandmarkIdx] = {
    use LandmarkIdx::*;
    &[
        Wrist,
        ThumbCmc,
        ThumbMcp,
        IndexFingerMcp,
        MiddleFingerMcp,
        RingFingerMcp,
        PinkyMcp,
        IndexFingerPip,
        MiddleFingerPip,
        RingFingerPip,
        PinkyPip,
    ]
};

/// Hand detector backed by the palm detection and hand landmark ONNX models.
pub struct HandTracker {
    palm: PalmDetector,
    landmarks: LandmarkModel,
    config: DetectorConfig,
    tracked: Vec<RotatedRoi>,
}

impl HandTracker {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let palm = PalmDetector::new(
            &config.palm_model,
            config.min_detection_confidence,
            config.intra_threads,
        )
        .context("failed to load palm detection model")?;
        let landmarks = LandmarkModel::new(&config.landmark_model, config.intra_threads)
            .context("failed to load hand landmark model")?;

        info!(
            "Hand tracker ready (max_num_hands={}, static_image_mode={})",
            config.max_num_hands, config.static_image_mode
        );

        Ok(Self {
            palm,
            landmarks,
            config,
            tracked: Vec::new(),
        })
    }
}

impl HandDetector for HandTracker {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<HandLandmarks>> {
        let tracked = if self.config.static_image_mode {
            Vec::new()
        } else {
            std::mem::take(&mut self.tracked)
        };
        let mut rois = merge_rois(tracked, Vec::new(), self.config.max_num_hands);

        if needs_detection(rois.len(), self.config.max_num_hands) {
            let palms = self.palm.detect(frame)?;
            debug!("Palm detector found {} palms", palms.len());
            let detected = palms.iter().map(|p| p.roi()).collect();
            rois = merge_rois(rois, detected, self.config.max_num_hands);
        }

        let mut hands = Vec::with_capacity(rois.len());
        for roi in &rois {
            let estimate = self.landmarks.estimate(frame, roi)?;
            if estimate.presence < self.config.min_tracking_confidence {
                continue;
            }

            let hand = to_frame_landmarks(&estimate, roi, frame.width, frame.height);
            trace!(
                "Hand {:?} (score {:.2}) wrist at ({:.3}, {:.3})",
                hand.handedness(),
                hand.score(),
                hand.wrist().x,
                hand.wrist().y
            );
            if !self.config.static_image_mode {
                self.tracked.push(roi_from_landmarks(&hand, frame.width, frame.height));
            }
            hands.push(hand);
        }

        Ok(hands)
    }
}

fn needs_detection(tracked: usize, max_num_hands: usize) -> bool {
    tracked < max_num_hands
}

/// Whether `roi` overlaps any crop in `kept` enough to be the same hand.
fn overlaps_any(kept: &[RotatedRoi], roi: &RotatedRoi) -> bool {
    let rect = roi.bounding_rect();
    kept.iter()
        .any(|k| k.bounding_rect().iou(&rect) > TRACKED_OVERLAP_IOU)
}

/// Combines tracked and newly detected crops, keeping at most `max` crops and one per hand.
///
/// Tracked crops come first. Two tracked crops that converged on the same hand are collapsed, so
/// the freed slot can be filled by palm detection.
fn merge_rois(tracked: Vec<RotatedRoi>, detected: Vec<RotatedRoi>, max: usize) -> Vec<RotatedRoi> {
    let mut merged: Vec<RotatedRoi> = Vec::with_capacity(max);
    for roi in tracked.into_iter().chain(detected) {
        if merged.len() >= max {
            break;
        }
        if !overlaps_any(&merged, &roi) {
            merged.push(roi);
        }
    }
    merged
}

fn to_frame_landmarks(
    estimate: &LandmarkEstimate,
    roi: &RotatedRoi,
    width: u32,
    height: u32,
) -> HandLandmarks {
    let (w, h) = (width as f32, height as f32);
    let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
    for (out, &(u, v, z)) in landmarks.iter_mut().zip(&estimate.points) {
        let (x, y) = roi.to_frame(u, v);
        *out = Landmark::new(x / w, y / h, z * roi.size / w);
    }

    let handedness = if estimate.raw_handedness > 0.5 {
        Handedness::Right
    } else {
        Handedness::Left
    };

    HandLandmarks::new(landmarks)
        .with_handedness(handedness)
        .with_score(estimate.presence)
}

/// Derives next frame's crop from a hand's landmarks.
fn roi_from_landmarks(hand: &HandLandmarks, width: u32, height: u32) -> RotatedRoi {
    let (w, h) = (width as f32, height as f32);
    let px = |idx: LandmarkIdx| {
        let lm = hand.landmark(idx);
        (lm.x * w, lm.y * h)
    };

    let angle = RotatedRoi::angle_between(px(LandmarkIdx::Wrist), px(LandmarkIdx::MiddleFingerMcp));

    // Bounding box of the palm landmarks in the rotated frame.
    let (sin, cos) = angle.sin_cos();
    let rotated: Vec<(f32, f32)> = PALM_LANDMARKS
        .iter()
        .map(|idx| {
            let (x, y) = px(*idx);
            (x * cos + y * sin, -x * sin + y * cos)
        })
        .collect();
    let (mut x0, mut y0) = rotated[0];
    let (mut x1, mut y1) = rotated[0];
    for (x, y) in &rotated[1..] {
        x0 = x0.min(*x);
        y0 = y0.min(*y);
        x1 = x1.max(*x);
        y1 = y1.max(*y);
    }
    let bounds = Rect::from_corners(x0, y0, x1, y1);
    let (rx, ry) = bounds.center();

    RotatedRoi {
        x_center: rx * cos - ry * sin,
        y_center: rx * sin + ry * cos,
        size: bounds.width().max(bounds.height()),
        angle,
    }
    .shifted(0.0, TRACKING_ROI_SHIFT_Y * bounds.height())
    .scaled(TRACKING_ROI_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roi(x: f32, y: f32, size: f32) -> RotatedRoi {
        RotatedRoi { x_center: x, y_center: y, size, angle: 0.0 }
    }

    #[test]
    fn detection_runs_only_below_max_hands() {
        assert!(needs_detection(0, 2));
        assert!(needs_detection(1, 2));
        assert!(!needs_detection(2, 2));
    }

    #[test]
    fn merge_skips_palms_already_tracked() {
        let tracked = vec![roi(100.0, 100.0, 50.0)];
        let detected = vec![roi(102.0, 100.0, 50.0), roi(400.0, 100.0, 50.0)];
        let merged = merge_rois(tracked, detected, 2);
        assert_eq!(merged, vec![roi(100.0, 100.0, 50.0), roi(400.0, 100.0, 50.0)]);
    }

    #[test]
    fn tracked_crops_on_the_same_hand_collapse() {
        let tracked = vec![roi(100.0, 100.0, 50.0), roi(101.0, 100.0, 50.0)];
        let merged = merge_rois(tracked, Vec::new(), 2);
        assert_eq!(merged, vec![roi(100.0, 100.0, 50.0)]);
        assert!(needs_detection(merged.len(), 2));
    }

    #[test]
    fn collapsed_slot_is_refilled_by_detection() {
        let tracked = vec![roi(100.0, 100.0, 50.0), roi(101.0, 100.0, 50.0)];
        let detected = vec![roi(100.0, 101.0, 50.0), roi(300.0, 100.0, 50.0)];
        let merged = merge_rois(tracked, detected, 2);
        assert_eq!(merged, vec![roi(100.0, 100.0, 50.0), roi(300.0, 100.0, 50.0)]);
    }

    #[test]
    fn separate_tracked_hands_are_kept() {
        let tracked = vec![roi(100.0, 100.0, 50.0), roi(140.0, 100.0, 50.0)];
        assert_eq!(merge_rois(tracked.clone(), Vec::new(), 2), tracked);
    }

    #[test]
    fn merge_respects_max_hands() {
        let detected = vec![roi(0.0, 0.0, 10.0), roi(100.0, 0.0, 10.0), roi(200.0, 0.0, 10.0)];
        assert_eq!(merge_rois(Vec::new(), detected, 2).len(), 2);
    }

    #[test]
    fn landmarks_map_back_to_normalized_frame() {
        let mut points = [(0.5, 0.5, 0.0); NUM_LANDMARKS];
        points[0] = (0.0, 0.0, 0.1);
        let estimate = LandmarkEstimate {
            points,
            presence: 0.9,
            raw_handedness: 0.2,
        };
        let hand = to_frame_landmarks(&estimate, &roi(200.0, 100.0, 100.0), 400, 200);

        assert_eq!(hand.handedness(), Handedness::Left);
        assert_eq!(hand.score(), 0.9);
        assert_eq!(hand.landmark(LandmarkIdx::ThumbCmc), Landmark::new(0.5, 0.5, 0.0));
        let wrist = hand.wrist();
        assert!((wrist.x - 0.375).abs() < 1e-6);
        assert!((wrist.y - 0.25).abs() < 1e-6);
        assert!((wrist.z - 0.025).abs() < 1e-6);
    }

    #[test]
    fn tracking_roi_covers_the_hand() {
        // Upright hand: wrist at the bottom, fingers above.
        let mut landmarks = [Landmark::new(0.5, 0.4, 0.0); NUM_LANDMARKS];
        landmarks[LandmarkIdx::Wrist as usize] = Landmark::new(0.5, 0.6, 0.0);
        landmarks[LandmarkIdx::MiddleFingerMcp as usize] = Landmark::new(0.5, 0.45, 0.0);
        landmarks[LandmarkIdx::IndexFingerMcp as usize] = Landmark::new(0.45, 0.45, 0.0);
        landmarks[LandmarkIdx::PinkyMcp as usize] = Landmark::new(0.55, 0.45, 0.0);
        let hand = HandLandmarks::new(landmarks);

        let next = roi_from_landmarks(&hand, 100, 100);
        assert!(next.angle.abs() < 1e-5);
        // Palm box spans y 40..60: shifted 2px up from y=50, then doubled to 40px.
        assert!((next.size - 40.0).abs() < 1e-3);
        assert!((next.x_center - 50.0).abs() < 1e-3);
        assert!((next.y_center - 48.0).abs() < 1e-3);
    }
}
