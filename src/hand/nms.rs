//! Non-maximum averaging of overlapping palm detections.
//!
//! The palm network reports the same palm through many neighboring anchors. Overlapping detections
//! are merged into a confidence-weighted average, which jitters less between frames than keeping
//! only the strongest one.

use super::palm::{PalmDetection, NUM_PALM_KEYPOINTS};
use crate::geometry::Rect;

pub struct NonMaxSuppression {
    iou_thresh: f32,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
        }
    }

    pub fn process(&self, mut detections: Vec<PalmDetection>) -> Vec<PalmDetection> {
        let mut out = Vec::new();

        // Ascending confidence, so the strongest detection is popped first.
        detections.sort_unstable_by(|a, b| a.score.total_cmp(&b.score));

        while let Some(seed) = detections.pop() {
            let mut group = vec![seed];
            detections.retain(|other| {
                if group[0].rect.iou(&other.rect) >= self.iou_thresh {
                    group.push(other.clone());
                    false
                } else {
                    true
                }
            });
            out.push(average(&group));
        }

        out
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

fn average(group: &[PalmDetection]) -> PalmDetection {
    let mut divisor = 0.0;
    let (mut xc, mut yc, mut w, mut h) = (0.0, 0.0, 0.0, 0.0);
    let mut keypoints = [(0.0, 0.0); NUM_PALM_KEYPOINTS];

    for det in group {
        let factor = det.score;
        divisor += factor;
        let (cx, cy) = det.rect.center();
        xc += cx * factor;
        yc += cy * factor;
        w += det.rect.width() * factor;
        h += det.rect.height() * factor;
        for (acc, kp) in keypoints.iter_mut().zip(&det.keypoints) {
            acc.0 += kp.0 * factor;
            acc.1 += kp.1 * factor;
        }
    }

    if divisor <= 0.0 {
        return group[0].clone();
    }
    for kp in &mut keypoints {
        kp.0 /= divisor;
        kp.1 /= divisor;
    }

    PalmDetection {
        score: group[0].score,
        rect: Rect::from_center(xc / divisor, yc / divisor, w / divisor, h / divisor),
        keypoints,
    }
}
