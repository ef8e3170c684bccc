//! Nokhwa-based webcam capture backend.

use super::{CameraInfo, CaptureBackend, CaptureConfig};
use crate::frame::{PixelFormat, VideoFrame};
use anyhow::{anyhow, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use tracing::{debug, info, warn};

/// Webcam capture using the nokhwa library.
pub struct NokhwaCapture {
    camera: Camera,
    width: u32,
    height: u32,
    released: bool,
}

/// Formats to try when opening the camera, most preferred first.
///
/// The requested resolution comes first in every encoding the drivers commonly offer, followed by
/// 720p and VGA fallbacks for cameras that reject it.
fn seed_formats(config: &CaptureConfig) -> Vec<CameraFormat> {
    let encodings = [FrameFormat::MJPEG, FrameFormat::YUYV, FrameFormat::NV12];
    let resolutions = [(config.width, config.height), (1280, 720), (640, 480)];

    let mut seeds = Vec::new();
    for (width, height) in resolutions {
        for format in encodings {
            let seed = CameraFormat::new(Resolution::new(width, height), format, config.fps);
            if !seeds.contains(&seed) {
                seeds.push(seed);
            }
        }
    }
    seeds
}

impl CaptureBackend for NokhwaCapture {
    fn list_devices() -> Result<Vec<CameraInfo>> {
        let devices = nokhwa::query(ApiBackend::Auto)?;
        Ok(devices
            .into_iter()
            .map(|d| CameraInfo {
                index: d.index().as_index().unwrap_or(0),
                name: d.human_name().to_string(),
            })
            .collect())
    }

    fn open(config: CaptureConfig) -> Result<Self> {
        let mut camera = None;

        // Creating the camera object isn't enough for some drivers, so a seed only counts once
        // the stream actually opens.
        for seed in seed_formats(&config) {
            let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(seed));
            let idx = CameraIndex::Index(config.device_index);

            match Camera::new(idx, requested) {
                Ok(mut cam) => match cam.open_stream() {
                    Ok(()) => {
                        info!("Verified connection with seed format: {:?}", seed);
                        camera = Some(cam);
                        break;
                    }
                    Err(e) => debug!("Seed format {:?} failed to stream: {}", seed, e),
                },
                Err(e) => debug!("Seed format {:?} rejected: {}", seed, e),
            }
        }

        let camera = camera.ok_or_else(|| {
            anyhow!(
                "Could not connect to and open stream on camera index {} with any standard format.",
                config.device_index
            )
        })?;

        let resolution = camera.resolution();
        if (resolution.width(), resolution.height()) != (config.width, config.height) {
            warn!(
                "Requested {}x{}, camera delivers {}",
                config.width, config.height, resolution
            );
        }
        info!("Camera opened with resolution: {}", resolution);

        Ok(Self {
            camera,
            width: resolution.width(),
            height: resolution.height(),
            released: false,
        })
    }

    fn capture_frame(&mut self) -> Option<VideoFrame> {
        if self.released {
            return None;
        }

        let frame = match self.camera.frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to read camera frame: {}", e);
                return None;
            }
        };
        let decoded = match frame.decode_image::<RgbFormat>() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Failed to decode camera frame: {}", e);
                return None;
            }
        };

        let (width, height) = decoded.dimensions();
        Some(VideoFrame::from_data(width, height, PixelFormat::Rgb, decoded.into_raw()))
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.camera.stop_stream() {
            warn!("Failed to stop camera stream: {}", e);
        }
        info!("Camera released");
    }
}

impl Drop for NokhwaCapture {
    fn drop(&mut self) {
        self.release();
    }
}
