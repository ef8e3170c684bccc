//! The per-frame pipeline: capture, detect, annotate, display.

use crate::capture::CaptureBackend;
use crate::hand::HandDetector;
use crate::output::OutputBackend;
use crate::overlay::{Annotations, OverlayRenderer};
use crate::proximity::DEFAULT_PROXIMITY_THRESHOLD;
use crate::utils::FpsCounter;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default time to wait for input after presenting a frame.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(5);

/// Why the processing loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The capture source returned no frame.
    CaptureExhausted,
    /// The quit key was pressed or the window was closed.
    QuitRequested,
    /// The shutdown flag was set, usually by Ctrl-C.
    Shutdown,
}

/// Statistics of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    /// Frames on which two hands were within the proximity threshold
    pub close_frames: u64,
    pub exit_reason: ExitReason,
}

/// Drives frames from a capture source through hand detection to an output.
pub struct FrameProcessor<C, D, O> {
    capture: C,
    detector: D,
    output: O,
    renderer: OverlayRenderer,
    threshold: f32,
    wait: Duration,
    shutdown: Option<Arc<AtomicBool>>,
    fps: FpsCounter,
    frames: u64,
    close_frames: u64,
}

impl<C, D, O> FrameProcessor<C, D, O>
where
    C: CaptureBackend,
    D: HandDetector,
    O: OutputBackend,
{
    pub fn new(capture: C, detector: D, output: O, renderer: OverlayRenderer) -> Self {
        Self {
            capture,
            detector,
            output,
            renderer,
            threshold: DEFAULT_PROXIMITY_THRESHOLD,
            wait: DEFAULT_WAIT,
            shutdown: None,
            fps: FpsCounter::new(),
            frames: 0,
            close_frames: 0,
        }
    }

    /// Sets the wrist distance in pixels below which two hands count as close.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Stops the loop after the current frame once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Runs until the capture source is exhausted, the user quits, or shutdown is requested.
    ///
    /// The capture source and the output are released before returning, also when a stage fails.
    pub fn run(mut self) -> Result<RunSummary> {
        let (width, height) = self.capture.frame_size();
        info!(
            "Processing {}x{} frames, proximity threshold {} px",
            width, height, self.threshold
        );

        let result = loop {
            match self.process_frame() {
                Ok(None) => {}
                Ok(Some(reason)) => break Ok(reason),
                Err(e) => break Err(e),
            }
        };

        self.capture.release();
        self.output.close();

        let exit_reason = result?;
        info!(
            "Stopped after {} frames ({:?})",
            self.frames, exit_reason
        );
        Ok(RunSummary {
            frames: self.frames,
            close_frames: self.close_frames,
            exit_reason,
        })
    }

    /// Processes one frame. Returns the exit reason once the loop should stop.
    fn process_frame(&mut self) -> Result<Option<ExitReason>> {
        let Some(mut frame) = self.capture.capture_frame() else {
            info!("Capture source returned no frame");
            return Ok(Some(ExitReason::CaptureExhausted));
        };

        frame.mirror_horizontal();
        let rgb = frame.to_rgb();
        let hands = self.detector.detect(&rgb).context("hand detection failed")?;

        let mut display = rgb.to_rgba();
        let annotations = Annotations::plan(&hands, display.width, display.height, self.threshold);
        if let Some(pair) = &annotations.wrists {
            debug!("Wrist distance: {:.1} px", pair.distance);
        }
        self.renderer.render(&mut display, &annotations)?;
        self.output
            .write_frame(&display)
            .context("failed to present frame")?;

        self.frames += 1;
        if annotations.is_close() {
            self.close_frames += 1;
        }
        if let Some(fps) = self.fps.update() {
            // Bind first: tracing's macros import `field::display`, shadowing the local.
            let (width, height) = (display.width, display.height);
            debug!(
                "[Perf] Processing at {:.2} FPS ({}x{}, {} hands)",
                fps,
                width,
                height,
                hands.len()
            );
        }

        if self.output.poll_quit(self.wait) {
            return Ok(Some(ExitReason::QuitRequested));
        }
        if let Some(flag) = &self.shutdown {
            if flag.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                return Ok(Some(ExitReason::Shutdown));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraInfo, CaptureConfig};
    use crate::frame::{PixelFormat, VideoFrame};
    use crate::hand::HandLandmarks;
    use anyhow::anyhow;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct FakeCapture {
        frames: VecDeque<VideoFrame>,
        releases: Rc<Cell<u32>>,
    }

    impl FakeCapture {
        fn new(frames: Vec<VideoFrame>) -> (Self, Rc<Cell<u32>>) {
            let releases = Rc::new(Cell::new(0));
            let capture = Self {
                frames: frames.into(),
                releases: releases.clone(),
            };
            (capture, releases)
        }
    }

    impl CaptureBackend for FakeCapture {
        fn list_devices() -> Result<Vec<CameraInfo>> {
            Ok(Vec::new())
        }

        fn open(_config: CaptureConfig) -> Result<Self> {
            Ok(Self::new(Vec::new()).0)
        }

        fn capture_frame(&mut self) -> Option<VideoFrame> {
            self.frames.pop_front()
        }

        fn frame_size(&self) -> (u32, u32) {
            self.frames.front().map_or((0, 0), |f| (f.width, f.height))
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    /// Returns the same hands for every frame, or fails.
    struct FakeDetector {
        hands: Option<Vec<HandLandmarks>>,
        seen: Rc<RefCell<Vec<VideoFrame>>>,
    }

    impl FakeDetector {
        fn returning(hands: Vec<HandLandmarks>) -> Self {
            Self {
                hands: Some(hands),
                seen: Rc::default(),
            }
        }

        fn failing() -> Self {
            Self {
                hands: None,
                seen: Rc::default(),
            }
        }
    }

    impl HandDetector for FakeDetector {
        fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<HandLandmarks>> {
            self.seen.borrow_mut().push(frame.clone());
            self.hands.clone().ok_or_else(|| anyhow!("model exploded"))
        }
    }

    #[derive(Default)]
    struct FakeOutput {
        written: Rc<RefCell<Vec<VideoFrame>>>,
        closes: Rc<Cell<u32>>,
        quit_after: Option<usize>,
    }

    impl OutputBackend for FakeOutput {
        fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
            self.written.borrow_mut().push(frame.clone());
            Ok(())
        }

        fn poll_quit(&mut self, _wait: Duration) -> bool {
            self.quit_after
                .is_some_and(|n| self.written.borrow().len() >= n)
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    fn frames(n: usize, width: u32, height: u32) -> Vec<VideoFrame> {
        (0..n)
            .map(|_| VideoFrame::new(width, height, PixelFormat::Rgb))
            .collect()
    }

    fn processor(
        capture: FakeCapture,
        detector: FakeDetector,
        output: FakeOutput,
    ) -> FrameProcessor<FakeCapture, FakeDetector, FakeOutput> {
        FrameProcessor::new(capture, detector, output, OverlayRenderer::without_text())
            .with_wait(Duration::ZERO)
    }

    #[test]
    fn stops_when_capture_is_exhausted() {
        let (capture, releases) = FakeCapture::new(frames(3, 8, 8));
        let output = FakeOutput::default();
        let (written, closes) = (output.written.clone(), output.closes.clone());

        let summary = processor(capture, FakeDetector::returning(Vec::new()), output)
            .run()
            .unwrap();

        assert_eq!(summary.exit_reason, ExitReason::CaptureExhausted);
        assert_eq!(summary.frames, 3);
        assert_eq!(written.borrow().len(), 3);
        assert_eq!(releases.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn stops_on_quit_key() {
        let (capture, releases) = FakeCapture::new(frames(10, 8, 8));
        let output = FakeOutput {
            quit_after: Some(2),
            ..Default::default()
        };
        let closes = output.closes.clone();

        let summary = processor(capture, FakeDetector::returning(Vec::new()), output)
            .run()
            .unwrap();

        assert_eq!(summary.exit_reason, ExitReason::QuitRequested);
        assert_eq!(summary.frames, 2);
        assert_eq!(releases.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn stops_on_shutdown_flag() {
        let (capture, releases) = FakeCapture::new(frames(10, 8, 8));
        let output = FakeOutput::default();
        let closes = output.closes.clone();
        let flag = Arc::new(AtomicBool::new(true));

        let summary = processor(capture, FakeDetector::returning(Vec::new()), output)
            .with_shutdown(flag)
            .run()
            .unwrap();

        assert_eq!(summary.exit_reason, ExitReason::Shutdown);
        assert_eq!(summary.frames, 1);
        assert_eq!(releases.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn detector_error_propagates_after_release() {
        let (capture, releases) = FakeCapture::new(frames(3, 8, 8));
        let output = FakeOutput::default();
        let (written, closes) = (output.written.clone(), output.closes.clone());

        let err = processor(capture, FakeDetector::failing(), output)
            .run()
            .unwrap_err();

        assert!(format!("{:#}", err).contains("model exploded"));
        assert!(written.borrow().is_empty());
        assert_eq!(releases.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn zero_hands_presents_mirrored_frame() {
        let input = VideoFrame::from_data(2, 1, PixelFormat::Rgb, vec![1, 2, 3, 4, 5, 6]);
        let (capture, _) = FakeCapture::new(vec![input]);
        let detector = FakeDetector::returning(Vec::new());
        let seen = detector.seen.clone();
        let output = FakeOutput::default();
        let written = output.written.clone();

        processor(capture, detector, output).run().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen[0].format, PixelFormat::Rgb);
        assert_eq!(seen[0].data, vec![4, 5, 6, 1, 2, 3]);

        let written = written.borrow();
        assert_eq!(written[0].format, PixelFormat::Rgba);
        assert_eq!(written[0].data, vec![4, 5, 6, 255, 1, 2, 3, 255]);
    }

    #[test]
    fn bgr_input_is_converted_before_detection() {
        let input = VideoFrame::from_data(1, 1, PixelFormat::Bgr, vec![30, 20, 10]);
        let (capture, _) = FakeCapture::new(vec![input]);
        let detector = FakeDetector::returning(Vec::new());
        let seen = detector.seen.clone();

        processor(capture, detector, FakeOutput::default())
            .run()
            .unwrap();

        assert_eq!(seen.borrow()[0].data, vec![10, 20, 30]);
    }

    #[test]
    fn close_hands_are_counted_and_marked() {
        let (capture, _) = FakeCapture::new(frames(2, 400, 400));
        let hands = vec![HandLandmarks::at(0.25, 0.25), HandLandmarks::at(0.3, 0.25)];
        let output = FakeOutput::default();
        let written = output.written.clone();

        let summary = processor(capture, FakeDetector::returning(hands), output)
            .run()
            .unwrap();

        assert_eq!(summary.frames, 2);
        assert_eq!(summary.close_frames, 2);
        let px = written.borrow()[0].pixel(120, 110).unwrap().to_vec();
        assert!(px[2] > 240 && px[0] < 16 && px[1] < 16, "got {:?}", px);
    }

    #[test]
    fn far_hands_are_not_counted() {
        let (capture, _) = FakeCapture::new(frames(1, 400, 400));
        let hands = vec![HandLandmarks::at(0.0, 0.0), HandLandmarks::at(1.0, 1.0)];
        let output = FakeOutput::default();
        let written = output.written.clone();

        let summary = processor(capture, FakeDetector::returning(hands), output)
            .with_threshold(DEFAULT_PROXIMITY_THRESHOLD)
            .run()
            .unwrap();

        assert_eq!(summary.close_frames, 0);
        let px = written.borrow()[0].pixel(200, 200).unwrap().to_vec();
        assert!(px[1] > 240 && px[0] < 16 && px[2] < 16, "got {:?}", px);
    }

    #[test]
    fn threshold_is_configurable() {
        let (capture, _) = FakeCapture::new(frames(1, 400, 400));
        let hands = vec![HandLandmarks::at(0.25, 0.25), HandLandmarks::at(0.3, 0.25)];

        let summary = processor(capture, FakeDetector::returning(hands), FakeOutput::default())
            .with_threshold(20.0)
            .run()
            .unwrap();

        assert_eq!(summary.close_frames, 0);
    }
}
