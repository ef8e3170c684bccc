//! Anchor generation for the palm detector's Single Shot MultiBox output.
//!
//! Only handles fixed-size anchors, which is all the palm network needs.

use std::ops::Index;

/// An SSD anchor. Coordinates range from 0 to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    x_center: f32,
    y_center: f32,
}

impl Anchor {
    pub fn x_center(&self) -> f32 {
        self.x_center
    }

    pub fn y_center(&self) -> f32 {
        self.y_center
    }
}

/// Describes an output layer of an SSD network.
pub struct LayerInfo {
    /// Number of anchors per feature map cell. Must be non-zero.
    boxes_per_cell: u32,
    width: u32,
    height: u32,
}

impl LayerInfo {
    pub const fn new(boxes_per_cell: u32, width: u32, height: u32) -> Self {
        Self {
            boxes_per_cell,
            width,
            height,
        }
    }
}

pub struct Anchors {
    anchors: Vec<Anchor>,
}

impl Anchors {
    pub fn calculate(layers: &[LayerInfo]) -> Self {
        let mut anchors = Vec::new();

        for layer in layers {
            assert_ne!(layer.boxes_per_cell, 0);
            for y in 0..layer.height {
                for x in 0..layer.width {
                    let x_center = (x as f32 + 0.5) / layer.width as f32;
                    let y_center = (y as f32 + 0.5) / layer.height as f32;
                    for _ in 0..layer.boxes_per_cell {
                        anchors.push(Anchor { x_center, y_center });
                    }
                }
            }
        }

        Self { anchors }
    }

    /// Returns the total number of anchors.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

impl Index<usize> for Anchors {
    type Output = Anchor;

    fn index(&self, index: usize) -> &Anchor {
        &self.anchors[index]
    }
}
