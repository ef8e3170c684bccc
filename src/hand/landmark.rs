//! Hand landmark estimation inside a rotated crop.

use super::model::{ModelSpec, OnnxModel, TensorLayout};
use super::{ModelError, NUM_LANDMARKS};
use crate::frame::{PixelFormat, VideoFrame};
use crate::geometry::RotatedRoi;
use anyhow::{anyhow, Result};
use ndarray::Array4;

/// Width and height of the landmark network's input.
pub const LANDMARK_INPUT_SIZE: u32 = 224;

/// Raw output of the landmark network for one crop.
#[derive(Debug, Clone)]
pub struct LandmarkEstimate {
    /// Landmark positions in normalized crop coordinates; `z` uses the same scale as `x`.
    pub points: [(f32, f32, f32); NUM_LANDMARKS],
    /// Probability that the crop actually contains a hand.
    pub presence: f32,
    /// Values above 0.5 indicate a right hand.
    pub raw_handedness: f32,
}

pub struct LandmarkModel {
    model: OnnxModel,
}

impl LandmarkModel {
    pub fn new(spec: &ModelSpec, intra_threads: usize) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load(spec, intra_threads)?,
        })
    }

    pub fn estimate(&mut self, frame: &VideoFrame, roi: &RotatedRoi) -> Result<LandmarkEstimate> {
        if frame.format != PixelFormat::Rgb {
            return Err(ModelError::UnsupportedFormat(frame.format).into());
        }

        let input = crop_tensor(frame, roi, LANDMARK_INPUT_SIZE, self.model.layout());
        let outputs = self.model.run(input)?;
        let [landmarks, presence, handedness, ..] = outputs.as_slice() else {
            return Err(anyhow!(
                "landmark model returned {} outputs, expected 3",
                outputs.len()
            ));
        };

        let landmarks = landmarks.expect_len("hand landmarks", NUM_LANDMARKS * 3)?;
        let presence = presence.expect_len("hand presence", 1)?[0];
        let raw_handedness = handedness.expect_len("handedness", 1)?[0];

        Ok(LandmarkEstimate {
            points: normalize_points(landmarks, LANDMARK_INPUT_SIZE),
            presence,
            raw_handedness,
        })
    }
}

fn normalize_points(raw: &[f32], input_size: u32) -> [(f32, f32, f32); NUM_LANDMARKS] {
    let size = input_size as f32;
    let mut points = [(0.0, 0.0, 0.0); NUM_LANDMARKS];
    for (point, xyz) in points.iter_mut().zip(raw.chunks_exact(3)) {
        *point = (xyz[0] / size, xyz[1] / size, xyz[2] / size);
    }
    points
}

/// Resamples the rotated `roi` of an RGB frame into a `size`×`size` tensor with values in [0, 1].
///
/// Pixels outside the frame are black.
fn crop_tensor(frame: &VideoFrame, roi: &RotatedRoi, size: u32, layout: TensorLayout) -> Array4<f32> {
    let n = size as usize;
    let mut tensor = match layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, n, n)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, n, n, 3)),
    };

    for y in 0..n {
        for x in 0..n {
            let u = (x as f32 + 0.5) / size as f32;
            let v = (y as f32 + 0.5) / size as f32;
            let (fx, fy) = roi.to_frame(u, v);
            let rgb = sample_bilinear(frame, fx - 0.5, fy - 0.5);
            for (c, value) in rgb.into_iter().enumerate() {
                match layout {
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                }
            }
        }
    }

    tensor
}

fn sample_bilinear(frame: &VideoFrame, x: f32, y: f32) -> [f32; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = x - x0;
    let ty = y - y0;

    let texel = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 {
            return [0.0; 3];
        }
        match frame.pixel(px as u32, py as u32) {
            Some(p) => [p[0] as f32, p[1] as f32, p[2] as f32],
            None => [0.0; 3],
        }
    };

    let a = texel(x0, y0);
    let b = texel(x0 + 1.0, y0);
    let c = texel(x0, y0 + 1.0);
    let d = texel(x0 + 1.0, y0 + 1.0);

    let mut out = [0.0; 3];
    for i in 0..3 {
        let top = a[i] + (b[i] - a[i]) * tx;
        let bottom = c[i] + (d[i] - c[i]) * tx;
        out[i] = (top + (bottom - top) * ty) / 255.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_are_normalized_by_input_size() {
        let mut raw = vec![0.0; NUM_LANDMARKS * 3];
        raw[0] = 112.0;
        raw[1] = 56.0;
        raw[2] = -22.4;
        let points = normalize_points(&raw, 224);
        assert_eq!(points[0].0, 0.5);
        assert_eq!(points[0].1, 0.25);
        assert!((points[0].2 + 0.1).abs() < 1e-6);
    }

    #[test]
    fn crop_of_uniform_region_is_uniform() {
        let frame = VideoFrame::from_data(20, 20, PixelFormat::Rgb, vec![255; 20 * 20 * 3]);
        let roi = RotatedRoi { x_center: 10.0, y_center: 10.0, size: 8.0, angle: 0.4 };
        let tensor = crop_tensor(&frame, &roi, 4, TensorLayout::Nchw);
        assert!(tensor.iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn crop_outside_frame_is_black() {
        let frame = VideoFrame::from_data(4, 4, PixelFormat::Rgb, vec![255; 4 * 4 * 3]);
        let roi = RotatedRoi { x_center: 100.0, y_center: 100.0, size: 4.0, angle: 0.0 };
        let tensor = crop_tensor(&frame, &roi, 2, TensorLayout::Nhwc);
        assert!(tensor.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let frame = VideoFrame::from_data(2, 1, PixelFormat::Rgb, vec![0, 0, 0, 255, 255, 255]);
        let [r, _, _] = sample_bilinear(&frame, 0.5, 0.0);
        assert!((r - 0.5).abs() < 1e-6);
    }
}
