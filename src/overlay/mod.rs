//! Visual feedback drawn on top of each frame.
//!
//! [`Annotations::plan`] decides *what* to draw from a detection result, independent of any
//! pixels. [`OverlayRenderer`] then draws a plan onto an RGBA frame.

mod canvas;

pub use canvas::{Canvas, Color};

use crate::frame::VideoFrame;
use crate::geometry::PixelPoint;
use crate::hand::{HandLandmarks, HAND_CONNECTIONS, NUM_LANDMARKS};
use crate::proximity::WristPair;
use ab_glyph::FontVec;
use anyhow::Result;
use tracing::{info, warn};

/// Text shown when two hands are close.
pub const CLOSE_LABEL: &str = "Holding Hands!";

const LANDMARK_COLOR: Color = Color::rgb(255, 0, 0);
const LANDMARK_RADIUS: f32 = 3.0;
const CONNECTION_COLOR: Color = Color::rgb(224, 224, 224);
const CONNECTION_WIDTH: f32 = 2.0;
const WRIST_LINE_COLOR: Color = Color::rgb(0, 255, 0);
const WRIST_LINE_WIDTH: f32 = 3.0;
const LABEL_COLOR: Color = Color::rgb(255, 0, 0);
const LABEL_SIZE: f32 = 48.0;
const MARKER_COLOR: Color = Color::rgb(0, 0, 255);
const MARKER_RADIUS: f32 = 15.0;

/// One hand's landmarks in pixels. Landmarks outside the frame are `None` and not drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct HandSkeleton {
    pub points: [Option<PixelPoint>; NUM_LANDMARKS],
}

impl HandSkeleton {
    fn from_hand(hand: &HandLandmarks, width: u32, height: u32) -> Self {
        let mut points = [None; NUM_LANDMARKS];
        for (point, lm) in points.iter_mut().zip(hand.landmarks()) {
            let inside = (0.0..=1.0).contains(&lm.x) && (0.0..=1.0).contains(&lm.y);
            if inside {
                *point = Some(PixelPoint::from_normalized(lm.x, lm.y, width, height));
            }
        }
        Self { points }
    }
}

/// Label and wrist markers shown when two hands are close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseOverlay {
    /// Left end of the label's baseline.
    pub label_origin: PixelPoint,
    pub markers: [PixelPoint; 2],
}

/// Everything to draw on one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotations {
    pub hands: Vec<HandSkeleton>,
    pub wrists: Option<WristPair>,
    pub close: Option<CloseOverlay>,
}

impl Annotations {
    pub fn plan(hands: &[HandLandmarks], width: u32, height: u32, threshold: f32) -> Self {
        let skeletons = hands
            .iter()
            .map(|hand| HandSkeleton::from_hand(hand, width, height))
            .collect();

        let wrists = WristPair::from_hands(hands, width, height);
        let close = wrists.filter(|pair| pair.is_close(threshold)).map(|pair| CloseOverlay {
            label_origin: PixelPoint::new(width as i32 / 2 - 100, 50),
            markers: [pair.first, pair.second],
        });

        Self {
            hands: skeletons,
            wrists,
            close,
        }
    }

    pub fn is_close(&self) -> bool {
        self.close.is_some()
    }
}

/// Draws [`Annotations`] onto RGBA frames.
pub struct OverlayRenderer {
    font: Option<FontVec>,
}

impl OverlayRenderer {
    /// Creates a renderer using a sans-serif system font for the label.
    ///
    /// If no usable font is installed, the label is skipped and everything else is still drawn.
    pub fn new() -> Self {
        let font = canvas::load_system_font();
        match &font {
            Some(_) => info!("Loaded overlay font"),
            None => warn!("No usable system font found, the proximity label will not be drawn"),
        }
        Self { font }
    }

    /// Creates a renderer that never draws text.
    pub fn without_text() -> Self {
        Self { font: None }
    }

    pub fn render(&self, frame: &mut VideoFrame, annotations: &Annotations) -> Result<()> {
        let mut canvas = Canvas::new(frame)?;

        for hand in &annotations.hands {
            for (a, b) in HAND_CONNECTIONS {
                if let (Some(a), Some(b)) = (hand.points[*a as usize], hand.points[*b as usize]) {
                    canvas.line(a, b, CONNECTION_COLOR, CONNECTION_WIDTH);
                }
            }
            for point in hand.points.iter().flatten() {
                canvas.filled_circle(*point, LANDMARK_RADIUS, LANDMARK_COLOR);
            }
        }

        if let Some(pair) = &annotations.wrists {
            canvas.line(pair.first, pair.second, WRIST_LINE_COLOR, WRIST_LINE_WIDTH);
        }

        if let Some(close) = &annotations.close {
            if let Some(font) = &self.font {
                canvas.text(font, close.label_origin, LABEL_SIZE, CLOSE_LABEL, LABEL_COLOR);
            }
            for marker in close.markers {
                canvas.filled_circle(marker, MARKER_RADIUS, MARKER_COLOR);
            }
        }

        Ok(())
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::proximity::DEFAULT_PROXIMITY_THRESHOLD;

    fn two_hands(a: (f32, f32), b: (f32, f32)) -> Vec<HandLandmarks> {
        vec![HandLandmarks::at(a.0, a.1), HandLandmarks::at(b.0, b.1)]
    }

    fn blank() -> VideoFrame {
        VideoFrame::new(400, 400, PixelFormat::Rgba)
    }

    fn is_color(frame: &VideoFrame, x: u32, y: u32, rgb: [u8; 3]) -> bool {
        let px = frame.pixel(x, y).unwrap();
        px.iter().zip(rgb).all(|(a, b)| a.abs_diff(b) <= 8)
    }

    #[test]
    fn close_hands_get_label_and_markers() {
        let plan = Annotations::plan(&two_hands((0.25, 0.25), (0.3, 0.25)), 400, 400, 150.0);
        let wrists = plan.wrists.unwrap();
        assert_eq!(wrists.distance, 20.0);
        assert_eq!(
            plan.close,
            Some(CloseOverlay {
                label_origin: PixelPoint::new(100, 50),
                markers: [PixelPoint::new(100, 100), PixelPoint::new(120, 100)],
            })
        );
    }

    #[test]
    fn far_hands_get_only_the_line() {
        let plan = Annotations::plan(&two_hands((0.0, 0.0), (1.0, 1.0)), 400, 400, 150.0);
        assert!(plan.wrists.is_some());
        assert!(!plan.is_close());
        assert_eq!(plan.hands.len(), 2);
    }

    #[test]
    fn fewer_than_two_hands_skip_proximity() {
        let plan = Annotations::plan(&[HandLandmarks::at(0.5, 0.5)], 400, 400, 150.0);
        assert_eq!(plan.hands.len(), 1);
        assert!(plan.wrists.is_none());
        assert!(plan.close.is_none());

        let plan = Annotations::plan(&[], 400, 400, 150.0);
        assert_eq!(plan, Annotations::default());
    }

    #[test]
    fn three_hands_skip_proximity() {
        let hands = vec![
            HandLandmarks::at(0.1, 0.1),
            HandLandmarks::at(0.11, 0.1),
            HandLandmarks::at(0.12, 0.1),
        ];
        let plan = Annotations::plan(&hands, 400, 400, DEFAULT_PROXIMITY_THRESHOLD);
        assert_eq!(plan.hands.len(), 3);
        assert!(plan.wrists.is_none());
        assert!(!plan.is_close());
    }

    #[test]
    fn out_of_frame_landmarks_are_dropped() {
        let plan = Annotations::plan(&[HandLandmarks::at(1.2, 0.5)], 400, 400, 150.0);
        assert!(plan.hands[0].points.iter().all(|p| p.is_none()));
    }

    #[test]
    fn render_close_draws_blue_markers() {
        let mut frame = blank();
        let plan = Annotations::plan(&two_hands((0.25, 0.25), (0.3, 0.25)), 400, 400, 150.0);
        OverlayRenderer::without_text().render(&mut frame, &plan).unwrap();
        assert!(is_color(&frame, 100, 100, [0, 0, 255]));
        assert!(is_color(&frame, 120, 110, [0, 0, 255]));
        assert_eq!(frame.pixel(300, 300), Some(&[0, 0, 0, 0][..]));
    }

    #[test]
    fn render_far_draws_green_line_without_markers() {
        let mut frame = blank();
        let plan = Annotations::plan(&two_hands((0.0, 0.0), (1.0, 1.0)), 400, 400, 150.0);
        OverlayRenderer::without_text().render(&mut frame, &plan).unwrap();
        assert!(is_color(&frame, 200, 200, [0, 255, 0]));
        // Where a marker would be, but off the line.
        assert_eq!(frame.pixel(10, 0), Some(&[0, 0, 0, 0][..]));
    }

    fn red_pixels_above(frame: &VideoFrame, max_y: u32) -> Vec<(u32, u32)> {
        let mut found = Vec::new();
        for y in 0..max_y.min(frame.height) {
            for x in 0..frame.width {
                let px = frame.pixel(x, y).unwrap();
                if px[0] > 200 && px[1] < 60 && px[2] < 60 {
                    found.push((x, y));
                }
            }
        }
        found
    }

    #[test]
    fn close_plan_draws_label_on_baseline() {
        let Some(font) = canvas::load_system_font() else {
            eprintln!("no system font installed, skipping label test");
            return;
        };
        let renderer = OverlayRenderer { font: Some(font) };
        let mut frame = blank();
        // Hands low in the frame, away from the label.
        let plan = Annotations::plan(&two_hands((0.5, 0.75), (0.52, 0.75)), 400, 400, 150.0);
        assert!(plan.is_close());
        renderer.render(&mut frame, &plan).unwrap();

        let red = red_pixels_above(&frame, 200);
        assert!(!red.is_empty(), "label was not drawn");
        let min_x = red.iter().map(|p| p.0).min().unwrap();
        let max_y = red.iter().map(|p| p.1).max().unwrap();
        let min_y = red.iter().map(|p| p.1).min().unwrap();
        // Label starts near x = w/2 - 100 with its baseline at y = 50; only descenders go below.
        assert!((95..=125).contains(&min_x), "label starts at x={}", min_x);
        assert!(max_y <= 66, "label reaches y={}", max_y);
        assert!(min_y < 50, "label top at y={}", min_y);
    }

    #[test]
    fn far_plan_draws_no_label() {
        let Some(font) = canvas::load_system_font() else {
            eprintln!("no system font installed, skipping label test");
            return;
        };
        let renderer = OverlayRenderer { font: Some(font) };
        let mut frame = blank();
        let plan = Annotations::plan(&two_hands((0.1, 0.75), (0.9, 0.75)), 400, 400, 150.0);
        assert!(!plan.is_close());
        renderer.render(&mut frame, &plan).unwrap();

        assert!(red_pixels_above(&frame, 200).is_empty());
    }

    #[test]
    fn render_nothing_leaves_frame_unchanged() {
        let mut frame = blank();
        OverlayRenderer::without_text()
            .render(&mut frame, &Annotations::default())
            .unwrap();
        assert_eq!(frame, blank());
    }
}
