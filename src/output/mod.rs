//! Output backends for displaying processed video.

pub mod window_output;

pub use window_output::{WindowConfig, WindowOutput};

use crate::frame::VideoFrame;
use anyhow::Result;
use std::time::Duration;

/// Trait for video output backends.
pub trait OutputBackend {
    /// Write a frame to the output.
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Waits up to `wait` for user input and reports whether the user asked to quit.
    fn poll_quit(&mut self, wait: Duration) -> bool;

    /// Closes the output surface.
    fn close(&mut self) {}
}
