//! Pixel-space geometry: points, distances, and regions of interest.

use std::f32::consts::PI;

/// An integer pixel position inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Converts a normalized `[0, 1]` coordinate into pixels of a `width`×`height` frame.
    ///
    /// The scaled value is truncated toward zero, which is `floor` for in-frame coordinates.
    pub fn from_normalized(nx: f32, ny: f32, width: u32, height: u32) -> Self {
        Self {
            x: (nx * width as f32) as i32,
            y: (ny * height as f32) as i32,
        }
    }

    /// Euclidean distance to `other`, in pixels.
    pub fn distance(&self, other: &PixelPoint) -> f32 {
        let dx = (other.x - self.x) as f32;
        let dy = (other.y - self.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned rectangle with floating point coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Rect {
    pub fn from_center(xc: f32, yc: f32, w: f32, h: f32) -> Self {
        Self {
            x: xc - w * 0.5,
            y: yc - h * 0.5,
            w,
            h,
        }
    }

    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            w: (x1 - x0).abs(),
            h: (y1 - y0).abs(),
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.w
    }

    pub fn height(&self) -> f32 {
        self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.w).min(other.x + other.w);
        let y1 = (self.y + self.h).min(other.y + other.h);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::from_corners(x0, y0, x1, y1))
    }

    /// Intersection over union, in `[0, 1]`.
    pub fn iou(&self, other: &Rect) -> f32 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let inter = inter.area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// A rotated square region of a frame, in frame pixels.
///
/// `angle` is the clockwise rotation (radians) that maps the region's "up" direction onto the
/// frame. Points inside the region are addressed with normalized `(u, v)` coordinates where
/// `(0, 0)` is the rotated top-left corner and `(1, 1)` the rotated bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRoi {
    pub x_center: f32,
    pub y_center: f32,
    pub size: f32,
    pub angle: f32,
}

impl RotatedRoi {
    /// Returns the rotation that points the region's "up" axis from `from` towards `to`.
    pub fn angle_between(from: (f32, f32), to: (f32, f32)) -> f32 {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        normalize_radians(dx.atan2(-dy))
    }

    /// Maps normalized region coordinates into frame pixels.
    pub fn to_frame(&self, u: f32, v: f32) -> (f32, f32) {
        let ox = (u - 0.5) * self.size;
        let oy = (v - 0.5) * self.size;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.x_center + ox * cos - oy * sin,
            self.y_center + ox * sin + oy * cos,
        )
    }

    /// Maps a frame pixel position into normalized region coordinates.
    pub fn from_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let dx = x - self.x_center;
        let dy = y - self.y_center;
        let (sin, cos) = self.angle.sin_cos();
        let ox = dx * cos + dy * sin;
        let oy = -dx * sin + dy * cos;
        (ox / self.size + 0.5, oy / self.size + 0.5)
    }

    /// Moves the center by an offset expressed in the region's rotated axes.
    pub fn shifted(mut self, along_x: f32, along_y: f32) -> Self {
        let (sin, cos) = self.angle.sin_cos();
        self.x_center += along_x * cos - along_y * sin;
        self.y_center += along_x * sin + along_y * cos;
        self
    }

    pub fn scaled(mut self, factor: f32) -> Self {
        self.size *= factor;
        self
    }

    /// The axis-aligned rectangle enclosing the rotated region.
    pub fn bounding_rect(&self) -> Rect {
        let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)].map(|(u, v)| self.to_frame(u, v));
        let (mut x0, mut y0) = corners[0];
        let (mut x1, mut y1) = corners[0];
        for (x, y) in &corners[1..] {
            x0 = x0.min(*x);
            y0 = y0.min(*y);
            x1 = x1.max(*x);
            y1 = y1.max(*y);
        }
        Rect::from_corners(x0, y0, x1, y1)
    }
}

/// Wraps an angle into `[-PI, PI)`.
pub fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn distance_is_euclidean_and_symmetric() {
        let a = PixelPoint::new(100, 100);
        let b = PixelPoint::new(120, 100);
        assert_eq!(a.distance(&b), 20.0);
        assert_eq!(b.distance(&a), 20.0);

        let c = PixelPoint::new(3, -4);
        assert_eq!(PixelPoint::new(0, 0).distance(&c), 5.0);
        assert_eq!(c.distance(&PixelPoint::new(0, 0)), 5.0);

        let far = PixelPoint::new(0, 0).distance(&PixelPoint::new(400, 400));
        assert!(close(far, 565.685));
    }

    #[test]
    fn normalized_to_pixel_truncates() {
        assert_eq!(PixelPoint::from_normalized(0.5, 0.5, 1280, 720), PixelPoint::new(640, 360));
        assert_eq!(PixelPoint::from_normalized(0.2999, 0.9999, 10, 10), PixelPoint::new(2, 9));
        assert_eq!(PixelPoint::from_normalized(1.0, 0.0, 400, 400), PixelPoint::new(400, 0));
    }

    #[test]
    fn iou_of_overlapping_rects() {
        let a = Rect::from_corners(0.0, 0.0, 2.0, 2.0);
        let b = Rect::from_corners(1.0, 0.0, 3.0, 2.0);
        assert!(close(a.iou(&b), 2.0 / 6.0));
        assert!(close(a.iou(&a), 1.0));
        assert_eq!(a.iou(&Rect::from_corners(5.0, 5.0, 6.0, 6.0)), 0.0);
    }

    #[test]
    fn roi_without_rotation_is_axis_aligned() {
        let roi = RotatedRoi { x_center: 50.0, y_center: 40.0, size: 20.0, angle: 0.0 };
        let (x, y) = roi.to_frame(0.0, 0.0);
        assert!(close(x, 40.0) && close(y, 30.0));
        let rect = roi.bounding_rect();
        assert!(close(rect.width(), 20.0) && close(rect.height(), 20.0));
    }

    #[test]
    fn roi_mapping_round_trips() {
        let roi = RotatedRoi { x_center: 320.0, y_center: 200.0, size: 150.0, angle: 0.7 };
        let (x, y) = roi.to_frame(0.25, 0.8);
        let (u, v) = roi.from_frame(x, y);
        assert!(close(u, 0.25) && close(v, 0.8));
    }

    #[test]
    fn angle_points_up_axis_at_target() {
        // Target straight above: no rotation.
        assert!(close(RotatedRoi::angle_between((0.0, 0.0), (0.0, -1.0)), 0.0));
        // Target to the right: a quarter turn clockwise.
        let angle = RotatedRoi::angle_between((0.0, 0.0), (1.0, 0.0));
        assert!(close(angle, PI / 2.0));

        let roi = RotatedRoi { x_center: 0.0, y_center: 0.0, size: 2.0, angle };
        let (x, y) = roi.to_frame(0.5, 0.0);
        assert!(close(x, 1.0) && close(y, 0.0));
    }

    #[test]
    fn shift_moves_along_rotated_axes() {
        let roi = RotatedRoi { x_center: 0.0, y_center: 0.0, size: 10.0, angle: PI / 2.0 };
        let shifted = roi.shifted(0.0, -5.0);
        assert!(close(shifted.x_center, 5.0) && close(shifted.y_center, 0.0));
    }
}
