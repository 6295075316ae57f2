//! Instantaneous frames-per-second measurement.
//!
//! No smoothing window: each sample is `1 / elapsed` for a single interval.
//! A zero interval is skipped and the previous reading is kept.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Which interval an FPS sample measures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FpsTiming {
    /// Time between the starts of consecutive iterations (capture to capture).
    #[default]
    LoopStart,
    /// Time from inference start to the rendered frame, within one iteration.
    InferenceSpan,
}

impl FromStr for FpsTiming {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "loop-start" | "loop" => Ok(Self::LoopStart),
            "inference-span" | "inference" => Ok(Self::InferenceSpan),
            other => Err(anyhow!(
                "unknown fps timing '{}'; expected loop-start or inference",
                other
            )),
        }
    }
}

impl fmt::Display for FpsTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FpsTiming::LoopStart => f.write_str("loop-start"),
            FpsTiming::InferenceSpan => f.write_str("inference-span"),
        }
    }
}

/// Converts an interval into a rate. `None` for a zero interval.
pub fn fps_from_elapsed(elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| 1.0 / secs)
}

/// Tracks the most recent FPS sample for one timing convention.
#[derive(Clone, Debug)]
pub struct FpsMeter {
    timing: FpsTiming,
    previous_start: Option<Instant>,
    current: Option<f64>,
}

impl FpsMeter {
    pub fn new(timing: FpsTiming) -> Self {
        Self {
            timing,
            previous_start: None,
            current: None,
        }
    }

    pub fn timing(&self) -> FpsTiming {
        self.timing
    }

    /// Marks the start of an iteration. Under [`FpsTiming::LoopStart`] this
    /// produces a sample from the previous start; the first call only records
    /// the timestamp.
    pub fn iteration_started(&mut self, now: Instant) {
        if self.timing != FpsTiming::LoopStart {
            return;
        }
        if let Some(previous) = self.previous_start.replace(now) {
            self.record(now.saturating_duration_since(previous));
        }
    }

    /// Marks a finished inference-and-render span. Only sampled under
    /// [`FpsTiming::InferenceSpan`].
    pub fn span_finished(&mut self, started: Instant, finished: Instant) {
        if self.timing == FpsTiming::InferenceSpan {
            self.record(finished.saturating_duration_since(started));
        }
    }

    fn record(&mut self, elapsed: Duration) {
        if let Some(fps) = fps_from_elapsed(elapsed) {
            self.current = Some(fps);
        }
    }

    /// Latest sample, if one has been taken.
    pub fn current(&self) -> Option<f64> {
        self.current
    }

    /// Overlay text, e.g. `FPS: 29.97`, or `FPS: --` before the first sample.
    pub fn label(&self) -> String {
        match self.current {
            Some(fps) => format!("FPS: {fps:.2}"),
            None => "FPS: --".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_produces_no_sample() {
        assert_eq!(fps_from_elapsed(Duration::ZERO), None);
        assert_eq!(fps_from_elapsed(Duration::from_millis(40)), Some(25.0));
    }

    #[test]
    fn loop_start_measures_between_iterations() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(FpsTiming::LoopStart);

        meter.iteration_started(t0);
        assert_eq!(meter.current(), None);
        assert_eq!(meter.label(), "FPS: --");

        meter.iteration_started(t0 + Duration::from_millis(50));
        assert_eq!(meter.current(), Some(20.0));
        assert_eq!(meter.label(), "FPS: 20.00");

        // Spans are ignored under this convention.
        meter.span_finished(t0, t0 + Duration::from_millis(10));
        assert_eq!(meter.current(), Some(20.0));
    }

    #[test]
    fn loop_start_keeps_previous_value_on_zero_interval() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(100);
        let mut meter = FpsMeter::new(FpsTiming::LoopStart);
        meter.iteration_started(t0);
        meter.iteration_started(t1);
        meter.iteration_started(t1);
        assert_eq!(meter.current(), Some(10.0));
    }

    #[test]
    fn inference_span_measures_within_iteration() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(FpsTiming::InferenceSpan);
        meter.iteration_started(t0);
        meter.iteration_started(t0 + Duration::from_secs(1));
        assert_eq!(meter.current(), None);

        meter.span_finished(t0, t0 + Duration::from_millis(250));
        assert_eq!(meter.current(), Some(4.0));

        meter.span_finished(t0, t0);
        assert_eq!(meter.current(), Some(4.0));
    }

    #[test]
    fn timing_parses_aliases() {
        assert_eq!("loop_start".parse::<FpsTiming>().unwrap(), FpsTiming::LoopStart);
        assert_eq!("Inference".parse::<FpsTiming>().unwrap(), FpsTiming::InferenceSpan);
        assert!("median".parse::<FpsTiming>().is_err());
        assert_eq!(FpsTiming::InferenceSpan.to_string(), "inference-span");
    }
}
