//! Video frame types and pixel format conversions.

use bytemuck::{Pod, Zeroable};

/// Supported pixel formats for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb,
    /// BGR with 8 bits per channel (24 bits per pixel)
    Bgr,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba,
}

impl PixelFormat {
    /// Returns the number of bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// A video frame containing image data.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of the frame data
    pub format: PixelFormat,
    /// Timestamp in microseconds (if available)
    pub timestamp_us: Option<u64>,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Creates a new black video frame with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            timestamp_us: None,
            data: vec![0; size],
        }
    }

    /// Creates a video frame from existing data.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            timestamp_us: None,
            data,
        }
    }

    /// Returns the bytes of the pixel at `(x, y)`, or `None` if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = (y as usize * self.width as usize + x as usize) * bpp;
        self.data.get(start..start + bpp)
    }

    /// Mirrors the frame around its vertical axis, in place.
    ///
    /// Applying this twice restores the original frame.
    pub fn mirror_horizontal(&mut self) {
        let bpp = self.format.bytes_per_pixel();
        let row_len = self.width as usize * bpp;
        if row_len == 0 {
            return;
        }

        for row in self.data.chunks_exact_mut(row_len) {
            let (mut left, mut right) = (0, self.width as usize - 1);
            while left < right {
                for c in 0..bpp {
                    row.swap(left * bpp + c, right * bpp + c);
                }
                left += 1;
                right -= 1;
            }
        }
    }

    /// Converts this frame to RGB, the layout expected by the hand models.
    pub fn to_rgb(&self) -> VideoFrame {
        let data = match self.format {
            PixelFormat::Rgb => return self.clone(),
            PixelFormat::Bgr => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelFormat::Rgba => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };

        VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb,
            timestamp_us: self.timestamp_us,
            data,
        }
    }

    /// Converts this frame to RGBA format with an opaque alpha channel.
    pub fn to_rgba(&self) -> VideoFrame {
        if self.format == PixelFormat::Rgba {
            return self.clone();
        }

        let pixel_count = (self.width as usize) * (self.height as usize);
        let mut rgba_data = vec![0u8; pixel_count * 4];

        // Fast path for RGB -> RGBA: just add alpha=255, no color conversion needed
        let (r, b) = match self.format {
            PixelFormat::Bgr => (2, 0),
            _ => (0, 2),
        };
        for i in 0..pixel_count {
            rgba_data[i * 4] = self.data[i * 3 + r];
            rgba_data[i * 4 + 1] = self.data[i * 3 + 1];
            rgba_data[i * 4 + 2] = self.data[i * 3 + b];
            rgba_data[i * 4 + 3] = 255;
        }

        VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba,
            timestamp_us: self.timestamp_us,
            data: rgba_data,
        }
    }
}

/// Vertex for rendering a full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl QuadVertex {
    /// Vertices for a full-screen quad.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
        QuadVertex { position: [1.0, -1.0], tex_coords: [1.0, 1.0] },
        QuadVertex { position: [1.0, 1.0], tex_coords: [1.0, 0.0] },
        QuadVertex { position: [-1.0, 1.0], tex_coords: [0.0, 0.0] },
    ];

    /// Indices for the quad (two triangles).
    pub const INDICES: &'static [u16] = &[0, 1, 2, 2, 3, 0];

    /// Returns the vertex buffer layout.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        VideoFrame::from_data(width, height, PixelFormat::Rgb, data)
    }

    #[test]
    fn test_rgb_to_rgba_conversion() {
        let rgb_data = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let frame = VideoFrame::from_data(2, 2, PixelFormat::Rgb, rgb_data);
        let rgba_frame = frame.to_rgba();

        assert_eq!(rgba_frame.format, PixelFormat::Rgba);
        assert_eq!(rgba_frame.data.len(), 16);
        // Check first pixel (red)
        assert_eq!(&rgba_frame.data[0..4], &[255, 0, 0, 255]);
        // Check second pixel (green)
        assert_eq!(&rgba_frame.data[4..8], &[0, 255, 0, 255]);
    }

    #[test]
    fn test_bgr_to_rgb_swaps_channels() {
        let frame = VideoFrame::from_data(2, 1, PixelFormat::Bgr, vec![10, 20, 30, 40, 50, 60]);
        let rgb = frame.to_rgb();
        assert_eq!(rgb.format, PixelFormat::Rgb);
        assert_eq!(rgb.data, vec![30, 20, 10, 60, 50, 40]);
        assert_eq!(&frame.to_rgba().data[0..4], &[30, 20, 10, 255]);
    }

    #[test]
    fn test_rgba_to_rgb_drops_alpha() {
        let frame = VideoFrame::from_data(1, 1, PixelFormat::Rgba, vec![1, 2, 3, 4]);
        assert_eq!(frame.to_rgb().data, vec![1, 2, 3]);
    }

    #[test]
    fn test_mirror_swaps_columns() {
        let mut frame = VideoFrame::from_data(
            3,
            1,
            PixelFormat::Rgb,
            vec![1, 1, 1, 2, 2, 2, 3, 3, 3],
        );
        frame.mirror_horizontal();
        assert_eq!(frame.data, vec![3, 3, 3, 2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_mirror_twice_is_identity() {
        for (w, h) in [(1, 1), (4, 3), (5, 2), (640, 2)] {
            let original = gradient(w, h);
            let mut frame = original.clone();
            frame.mirror_horizontal();
            if w > 1 {
                assert_ne!(frame, original);
            }
            frame.mirror_horizontal();
            assert_eq!(frame, original);
        }
    }

    #[test]
    fn test_pixel_bounds() {
        let frame = gradient(2, 2);
        assert_eq!(frame.pixel(1, 1), Some(&frame.data[9..12]));
        assert_eq!(frame.pixel(2, 0), None);
    }
}
