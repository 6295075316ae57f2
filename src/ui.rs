//! Startup stage reporting on stderr.
//!
//! On a terminal each stage gets a spinner; otherwise a plain `==> stage`
//! line. A stage that is dropped without [`StageGuard::done`] (for example
//! when `?` bails out of setup) is reported as failed.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Uses stderr's terminal status to decide between spinners and lines.
    pub fn for_stderr(mode: UiMode) -> Self {
        Self::new(mode, std::io::stderr().is_terminal())
    }

    fn use_pretty(&self) -> bool {
        match self.mode {
            UiMode::Pretty => true,
            UiMode::Auto => self.is_tty,
            UiMode::Plain => false,
        }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    detail: Option<String>,
    succeeded: bool,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            detail: None,
            succeeded: false,
        }
    }

    /// Marks the stage successful.
    pub fn done(mut self) {
        self.succeeded = true;
    }

    /// Marks the stage successful with a detail such as the chosen device.
    pub fn done_with(mut self, detail: impl Into<String>) {
        self.detail = Some(detail.into());
        self.succeeded = true;
    }

    fn summary(&self) -> String {
        let mark = if self.succeeded { "✔" } else { "✘" };
        let elapsed = format_duration(self.start.elapsed());
        match &self.detail {
            Some(detail) => format!("{mark} {}: {detail} ({elapsed})", self.name),
            None => format!("{mark} {} ({elapsed})", self.name),
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = self.summary();
        if let Some(spinner) = &self.spinner {
            if self.succeeded {
                spinner.finish_with_message(message);
            } else {
                spinner.abandon_with_message(message);
            }
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
