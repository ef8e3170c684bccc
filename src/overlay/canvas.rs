//! 2D drawing onto RGBA frames.

use crate::frame::{PixelFormat, VideoFrame};
use crate::geometry::PixelPoint;
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{anyhow, Result};
use fontdb::{Database, Family, Query};
use tiny_skia::{FillRule, LineCap, Paint, PathBuilder, PixmapMut, Stroke, Transform};

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn paint(&self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(self.r, self.g, self.b, 255);
        paint.anti_alias = true;
        paint
    }
}

/// Anti-aliased drawing on top of an RGBA [`VideoFrame`].
pub struct Canvas<'a> {
    pixmap: PixmapMut<'a>,
}

impl<'a> Canvas<'a> {
    pub fn new(frame: &'a mut VideoFrame) -> Result<Self> {
        if frame.format != PixelFormat::Rgba {
            return Err(anyhow!("canvas requires an RGBA frame, got {:?}", frame.format));
        }
        let (width, height) = (frame.width, frame.height);
        let pixmap = PixmapMut::from_bytes(&mut frame.data, width, height)
            .ok_or_else(|| anyhow!("invalid frame buffer for {}x{} canvas", width, height))?;
        Ok(Self { pixmap })
    }

    pub fn line(&mut self, a: PixelPoint, b: PixelPoint, color: Color, width: f32) {
        let mut pb = PathBuilder::new();
        pb.move_to(a.x as f32, a.y as f32);
        pb.line_to(b.x as f32, b.y as f32);
        let Some(path) = pb.finish() else {
            return;
        };

        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            ..Default::default()
        };
        self.pixmap
            .stroke_path(&path, &color.paint(), &stroke, Transform::identity(), None);
    }

    pub fn filled_circle(&mut self, center: PixelPoint, radius: f32, color: Color) {
        let Some(path) = PathBuilder::from_circle(center.x as f32, center.y as f32, radius) else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &color.paint(),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }

    /// Draws `text` with its baseline starting at `origin`.
    pub fn text(&mut self, font: &FontVec, origin: PixelPoint, size: f32, text: &str, color: Color) {
        let scale = PxScale::from(size);
        let scaled_font = font.as_scaled(scale);
        let width = self.pixmap.width() as i32;
        let height = self.pixmap.height() as i32;
        let data = self.pixmap.data_mut();

        let mut cursor_x = origin.x as f32;
        let mut previous = None;
        for c in text.chars() {
            let glyph_id = scaled_font.glyph_id(c);
            if let Some(prev) = previous {
                cursor_x += scaled_font.kern(prev, glyph_id);
            }
            previous = Some(glyph_id);

            let glyph =
                glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, origin.y as f32));
            cursor_x += scaled_font.h_advance(glyph_id);

            let Some(outlined) = font.outline_glyph(glyph) else {
                // Whitespace has no outline.
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i32 + gx as i32;
                let y = bounds.min.y as i32 + gy as i32;
                if x < 0 || y < 0 || x >= width || y >= height {
                    return;
                }
                let i = ((y * width + x) * 4) as usize;
                blend(&mut data[i..i + 4], color, coverage.clamp(0.0, 1.0));
            });
        }
    }
}

fn blend(dst: &mut [u8], color: Color, alpha: f32) {
    let mix = |d: u8, s: u8| (s as f32 * alpha + d as f32 * (1.0 - alpha)).round() as u8;
    dst[0] = mix(dst[0], color.r);
    dst[1] = mix(dst[1], color.g);
    dst[2] = mix(dst[2], color.b);
    dst[3] = mix(dst[3], 255);
}

/// Finds a sans-serif system font, falling back to any installed face.
pub(super) fn load_system_font() -> Option<FontVec> {
    let mut db = Database::new();
    db.load_system_fonts();

    let query = Query {
        families: &[Family::SansSerif],
        ..Default::default()
    };
    let id = db.query(&query).or_else(|| db.faces().next().map(|f| f.id))?;
    let (data, index) = db.with_face_data(id, |data, index| (data.to_vec(), index))?;
    FontVec::try_from_vec_and_index(data, index).ok()
}
