//! The live detection loop.
//!
//! One iteration: capture, infer, render, present, poll the stop key. Any
//! per-iteration failure ends the run; nothing is retried. The frame source is
//! released and the viewer closed exactly once, whatever ended the run.

use anyhow::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::annotate::draw_fps;
use crate::config::RunConfig;
use crate::detect::{DetectorBackend, InferenceParams};
use crate::fps::{FpsMeter, FpsTiming};
use crate::ingest::FrameSource;
use crate::view::Viewer;

/// Why the loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The stop key was pressed.
    UserQuit,
    /// Ctrl-C or another external interrupt.
    Interrupted,
    /// The configured frame limit was reached.
    FrameLimit,
    CaptureFailed,
    InferenceFailed,
    DisplayFailed,
}

impl StopReason {
    /// True for the reasons caused by a failure rather than a request.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            StopReason::CaptureFailed | StopReason::InferenceFailed | StopReason::DisplayFailed
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::UserQuit => "stop key pressed",
            StopReason::Interrupted => "interrupted",
            StopReason::FrameLimit => "frame limit reached",
            StopReason::CaptureFailed => "frame capture failed",
            StopReason::InferenceFailed => "inference failed",
            StopReason::DisplayFailed => "display failed",
        };
        f.write_str(text)
    }
}

/// Outcome of a single iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop(StopReason),
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopReport {
    pub frames_displayed: u64,
    pub stop: StopReason,
    pub last_fps: Option<f64>,
    /// Rendered error for failure stops.
    pub error: Option<String>,
}

/// Loop parameters derived from the run config.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopSettings {
    pub params: InferenceParams,
    pub fps_timing: FpsTiming,
    pub stop_key: char,
    pub max_frames: Option<u64>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            params: InferenceParams::default(),
            fps_timing: FpsTiming::default(),
            stop_key: 'q',
            max_frames: None,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            params: InferenceParams {
                confidence: config.confidence,
                input_size: config.input_size,
                verbose: config.verbose,
            },
            fps_timing: config.fps_timing,
            stop_key: config.stop_key,
            max_frames: None,
        }
    }

    pub fn with_max_frames(self, max_frames: Option<u64>) -> Self {
        Self { max_frames, ..self }
    }
}

pub struct LiveLoop<S, D, V> {
    source: S,
    detector: D,
    viewer: V,
    settings: LoopSettings,
    meter: FpsMeter,
    interrupt: Option<Arc<AtomicBool>>,
    frames_displayed: u64,
    last_error: Option<String>,
    finished: bool,
}

impl<S, D, V> LiveLoop<S, D, V>
where
    S: FrameSource,
    D: DetectorBackend,
    V: Viewer,
{
    pub fn new(source: S, detector: D, viewer: V, settings: LoopSettings) -> Self {
        Self {
            source,
            detector,
            viewer,
            meter: FpsMeter::new(settings.fps_timing),
            settings,
            interrupt: None,
            frames_displayed: 0,
            last_error: None,
            finished: false,
        }
    }

    /// Stops the loop with [`StopReason::Interrupted`] once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }

    /// Runs one capture/infer/render/present/poll iteration.
    pub fn step(&mut self) -> Step {
        if self
            .interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Step::Stop(StopReason::Interrupted);
        }
        if self
            .settings
            .max_frames
            .is_some_and(|max| self.frames_displayed >= max)
        {
            return Step::Stop(StopReason::FrameLimit);
        }

        self.meter.iteration_started(Instant::now());
        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(err) => return self.fail(StopReason::CaptureFailed, err),
        };

        let inference_started = Instant::now();
        let result = match self.detector.detect(&frame, &self.settings.params) {
            Ok(result) => result,
            Err(err) => return self.fail(StopReason::InferenceFailed, err),
        };
        if self.settings.params.verbose {
            log::info!("frame {}: {}", frame.sequence, result.summary());
        }

        let mut annotated = result.plot(frame);
        self.meter
            .span_finished(inference_started, Instant::now());
        draw_fps(&mut annotated, &self.meter.label());

        if let Err(err) = self.viewer.show(&annotated) {
            return self.fail(StopReason::DisplayFailed, err);
        }
        self.frames_displayed += 1;

        match self.viewer.poll_key() {
            Ok(Some(key)) if key == self.settings.stop_key => Step::Stop(StopReason::UserQuit),
            Ok(_) => Step::Continue,
            Err(err) => self.fail(StopReason::DisplayFailed, err),
        }
    }

    fn fail(&mut self, reason: StopReason, err: anyhow::Error) -> Step {
        log::error!("{}: {:#}", reason, err);
        self.last_error = Some(format!("{:#}", err));
        Step::Stop(reason)
    }

    /// Iterates until a stop condition, then releases the source and closes
    /// the viewer.
    pub fn run(&mut self) -> LoopReport {
        let stop = loop {
            match self.step() {
                Step::Continue => {}
                Step::Stop(reason) => break reason,
            }
        };
        self.finish();

        let report = LoopReport {
            frames_displayed: self.frames_displayed,
            stop,
            last_fps: self.meter.current(),
            error: self.last_error.clone(),
        };
        log::info!(
            "detection loop stopped ({}) after {} frames",
            report.stop,
            report.frames_displayed
        );
        report
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.source.release();
        self.viewer.close();
    }
}

/// Opens the frame source and runs the loop to completion.
///
/// An open failure is returned as an error before any frame is read; the
/// viewer is still closed.
pub fn run_session<S, D, V, F>(
    open_source: F,
    detector: D,
    mut viewer: V,
    settings: LoopSettings,
    interrupt: Option<Arc<AtomicBool>>,
) -> Result<LoopReport>
where
    S: FrameSource,
    D: DetectorBackend,
    V: Viewer,
    F: FnOnce() -> Result<S>,
{
    let source = match open_source() {
        Ok(source) => source,
        Err(err) => {
            viewer.close();
            return Err(err.context("open frame source"));
        }
    };
    let mut live = LiveLoop::new(source, detector, viewer, settings);
    if let Some(flag) = interrupt {
        live = live.with_interrupt(flag);
    }
    Ok(live.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::frame::Frame;
    use anyhow::anyhow;
    use image::RgbImage;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Yields `frames` frames, then fails.
    struct ScriptedSource {
        frames: u64,
        read: u64,
        released: u32,
    }

    impl ScriptedSource {
        fn new(frames: u64) -> Self {
            Self {
                frames,
                read: 0,
                released: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Frame> {
            if self.read >= self.frames {
                return Err(anyhow!("camera unplugged"));
            }
            self.read += 1;
            Ok(Frame::from_image(RgbImage::new(32, 32), self.read))
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    /// Records presented frames and replays queued keys.
    #[derive(Default)]
    struct RecordingViewer {
        shown: Vec<u64>,
        keys: Vec<char>,
        fail_show: bool,
        closed: u32,
    }

    impl Viewer for RecordingViewer {
        fn show(&mut self, frame: &Frame) -> Result<()> {
            if self.fail_show {
                return Err(anyhow!("window vanished"));
            }
            self.shown.push(frame.sequence);
            Ok(())
        }

        fn poll_key(&mut self) -> Result<Option<char>> {
            Ok(if self.keys.is_empty() {
                None
            } else {
                Some(self.keys.remove(0))
            })
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    fn live(
        frames: u64,
        detector: StubBackend,
        viewer: RecordingViewer,
    ) -> LiveLoop<ScriptedSource, StubBackend, RecordingViewer> {
        LiveLoop::new(
            ScriptedSource::new(frames),
            detector,
            viewer,
            LoopSettings::default(),
        )
    }

    #[test]
    fn capture_failure_stops_after_previous_frames() {
        let mut live = live(3, StubBackend::new(), RecordingViewer::default());
        let report = live.run();

        assert_eq!(report.stop, StopReason::CaptureFailed);
        assert_eq!(report.frames_displayed, 3);
        assert_eq!(live.viewer().shown, vec![1, 2, 3]);
        assert!(report.error.is_some_and(|e| e.contains("camera unplugged")));
        assert_eq!(live.source().released, 1);
        assert_eq!(live.viewer().closed, 1);
    }

    #[test]
    fn inference_failure_stops_without_showing_the_frame() {
        let mut live = live(10, StubBackend::new().failing_on(2), RecordingViewer::default());
        let report = live.run();

        assert_eq!(report.stop, StopReason::InferenceFailed);
        assert_eq!(report.frames_displayed, 1);
        assert_eq!(live.detector().calls(), 2);
        assert_eq!(live.source().released, 1);
    }

    #[test]
    fn stop_key_ends_after_frame_is_shown() {
        let viewer = RecordingViewer {
            keys: vec!['x', 'q'],
            ..RecordingViewer::default()
        };
        let mut live = live(10, StubBackend::new(), viewer);
        assert_eq!(live.step(), Step::Continue);
        assert_eq!(live.step(), Step::Stop(StopReason::UserQuit));
        assert_eq!(live.frames_displayed(), 2);
    }

    #[test]
    fn display_failure_stops_and_still_releases() {
        let viewer = RecordingViewer {
            fail_show: true,
            ..RecordingViewer::default()
        };
        let mut live = live(10, StubBackend::new(), viewer);
        let report = live.run();
        assert_eq!(report.stop, StopReason::DisplayFailed);
        assert!(report.stop.is_failure());
        assert_eq!(report.frames_displayed, 0);
        assert_eq!(live.source().released, 1);
        assert_eq!(live.viewer().closed, 1);
    }

    #[test]
    fn interrupt_and_frame_limit_are_checked_before_capture() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut live = live(10, StubBackend::new(), RecordingViewer::default())
            .with_interrupt(flag);
        assert_eq!(live.run().stop, StopReason::Interrupted);
        assert_eq!(live.source().read, 0);

        let mut limited = LiveLoop::new(
            ScriptedSource::new(10),
            StubBackend::new(),
            RecordingViewer::default(),
            LoopSettings::default().with_max_frames(Some(4)),
        );
        let report = limited.run();
        assert_eq!(report.stop, StopReason::FrameLimit);
        assert_eq!(report.frames_displayed, 4);
        assert!(!report.stop.is_failure());
    }

    #[test]
    fn failed_open_never_reads_and_closes_viewer() {
        let closed = Rc::new(Cell::new(0));
        let result = run_session(
            || -> Result<ScriptedSource> { Err(anyhow!("no such camera")) },
            StubBackend::new(),
            NeverShownViewer {
                closed: Rc::clone(&closed),
            },
            LoopSettings::default(),
            None,
        );
        let err = result.err().map(|e| format!("{:#}", e));
        assert!(err.is_some_and(|e| e.contains("no such camera")));
        assert_eq!(closed.get(), 1);
    }

    struct NeverShownViewer {
        closed: Rc<Cell<u32>>,
    }

    impl Viewer for NeverShownViewer {
        fn show(&mut self, _frame: &Frame) -> Result<()> {
            panic!("nothing may be shown when the source fails to open");
        }

        fn poll_key(&mut self) -> Result<Option<char>> {
            Ok(None)
        }

        fn close(&mut self) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    #[test]
    fn fps_is_reported_after_second_frame() {
        let mut live = live(2, StubBackend::new(), RecordingViewer::default());
        let report = live.run();
        assert_eq!(report.frames_displayed, 2);
        // Two captures give one loop-start interval; it may be too short to
        // measure on a fast machine, so only the shape is checked.
        assert!(report.last_fps.map_or(true, |fps| fps > 0.0));
    }
}
