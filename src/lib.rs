//! Handhold: flags when two hands come close in a live webcam feed
//!
//! Captures video from a webcam, detects hand landmarks with ONNX models, and displays the mirrored
//! feed with the hand skeletons and a proximity overlay.

pub mod capture;
pub mod config;
pub mod frame;
pub mod geometry;
pub mod hand;
pub mod output;
pub mod overlay;
pub mod processor;
pub mod proximity;
pub mod utils;
