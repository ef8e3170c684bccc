//! Wrist-to-wrist proximity between two detected hands.

use crate::geometry::PixelPoint;
use crate::hand::HandLandmarks;

/// Pixel distance between wrists below which two hands count as close.
pub const DEFAULT_PROXIMITY_THRESHOLD: f32 = 150.0;

/// The wrist positions of exactly two hands and the distance between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WristPair {
    pub first: PixelPoint,
    pub second: PixelPoint,
    pub distance: f32,
}

impl WristPair {
    pub fn new(first: PixelPoint, second: PixelPoint) -> Self {
        Self {
            first,
            second,
            distance: first.distance(&second),
        }
    }

    /// Extracts the wrist pair from a detection result.
    ///
    /// Returns `None` unless exactly two hands were detected.
    pub fn from_hands(hands: &[HandLandmarks], width: u32, height: u32) -> Option<Self> {
        let [a, b] = hands else {
            return None;
        };
        let wrist = |hand: &HandLandmarks| {
            let lm = hand.wrist();
            PixelPoint::from_normalized(lm.x, lm.y, width, height)
        };
        Some(Self::new(wrist(a), wrist(b)))
    }

    /// Strictly closer than `threshold`; a distance equal to the threshold is not close.
    pub fn is_close(&self, threshold: f32) -> bool {
        self.distance < threshold
    }
}
