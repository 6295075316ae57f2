//! live_detect - real-time object detection on a camera stream
//!
//! This binary:
//! 1. Resolves the run configuration (file, `LIVE_DETECT_*` env, flags)
//! 2. Asks for the model input size when none was configured
//! 3. Loads the detector and opens the camera
//! 4. Shows annotated frames until the stop key, Ctrl-C or an error

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use live_detect::{
    build_backend, choose_input_size, run_session,
    ui::{Ui, UiMode},
    CameraConfig, CameraSource, ConfigOverrides, HeadlessViewer, LoopSettings, RunConfig, Viewer,
};
#[cfg(feature = "opencv")]
use live_detect::SnapshotViewer;

#[derive(Parser, Debug)]
#[command(
    name = "live_detect",
    about = "Run a YOLO detector on a live camera stream and display the results"
)]
struct Args {
    /// JSON or TOML config file (also LIVE_DETECT_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// ONNX model file
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Newline-separated class names for non-COCO models
    #[arg(long, value_name = "PATH")]
    labels: Option<PathBuf>,

    /// Detector backend (tract|stub)
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,

    /// Camera index, device path or stub:// URL
    #[arg(long, value_name = "SOURCE")]
    camera: Option<String>,

    /// Square model input size; rounded down to a multiple of 32
    #[arg(long, value_name = "PIXELS", allow_negative_numbers = true)]
    input_size: Option<i64>,

    /// Never prompt for the input size
    #[arg(long)]
    no_prompt: bool,

    /// Confidence threshold in [0, 1]
    #[arg(long, value_name = "SCORE")]
    conf: Option<f32>,

    /// Compute device (auto|cpu|cuda)
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// FPS measurement (loop-start|inference)
    #[arg(long, value_name = "MODE")]
    fps_timing: Option<String>,

    /// Key that ends the run
    #[arg(long, value_name = "KEY")]
    stop_key: Option<char>,

    /// Do not open a window
    #[arg(long)]
    headless: bool,

    /// Save the last displayed frame here when the run ends
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Stop after this many displayed frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Log a detection summary for every frame
    #[arg(short, long)]
    verbose: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE")]
    ui: UiMode,
}

impl Args {
    fn overrides(&self) -> Result<ConfigOverrides> {
        Ok(ConfigOverrides {
            config_path: self.config.clone(),
            model_path: self.model.clone(),
            labels_path: self.labels.clone(),
            backend: self.backend.as_deref().map(str::parse).transpose()?,
            camera: self.camera.clone(),
            input_size: self.input_size,
            confidence: self.conf,
            device: self.device.as_deref().map(str::parse).transpose()?,
            fps_timing: self.fps_timing.as_deref().map(str::parse).transpose()?,
            stop_key: self.stop_key,
            window_title: None,
            verbose: self.verbose,
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::for_stderr(args.ui);

    let stage = ui.stage("Load configuration");
    let mut config = RunConfig::load(&args.overrides()?)?;
    stage.done();

    if !config.input_size_explicit && !args.no_prompt && std::io::stdin().is_terminal() {
        let stdin = std::io::stdin();
        let selection = choose_input_size(&mut stdin.lock(), &mut std::io::stdout())?;
        config = config.with_input_size(selection.size);
    }
    log::info!(
        "input size {}, confidence {}, fps timing {}",
        config.input_size,
        config.confidence,
        config.fps_timing
    );

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupt);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    let settings = LoopSettings::from_config(&config).with_max_frames(args.max_frames);
    let stage = ui.stage("Load model");
    let mut detector = build_backend(&config)?;
    detector.warm_up(&settings.params)?;
    stage.done_with(format!("{} on {}", detector.name(), detector.device()));

    let viewer = open_viewer(&args, &config)?;
    let camera = CameraConfig::square(config.camera.clone(), config.input_size.get());
    let report = run_session(
        || {
            let stage = ui.stage("Open camera");
            let source = CameraSource::open(&camera)?;
            stage.done_with(source.backend_name());
            Ok(source)
        },
        detector,
        viewer,
        settings,
        Some(interrupt),
    )?;

    println!(
        "live_detect: {} frames displayed, stopped: {}",
        report.frames_displayed, report.stop
    );
    if let Some(fps) = report.last_fps {
        println!("live_detect: last FPS {:.2}", fps);
    }
    if report.stop.is_failure() {
        return Err(anyhow!(
            "detection loop ended abnormally: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn open_viewer(args: &Args, config: &RunConfig) -> Result<Box<dyn Viewer>> {
    if args.headless {
        return Ok(headless_viewer(args));
    }
    window_viewer(args, config)
}

fn headless_viewer(args: &Args) -> Box<dyn Viewer> {
    log::info!("running headless; press Ctrl-C to stop");
    match &args.snapshot {
        Some(path) => Box::new(HeadlessViewer::with_snapshot(path)),
        None => Box::new(HeadlessViewer::new()),
    }
}

#[cfg(feature = "opencv")]
fn window_viewer(args: &Args, config: &RunConfig) -> Result<Box<dyn Viewer>> {
    let viewer = live_detect::WindowViewer::open(&config.window_title)?;
    log::info!("press '{}' in the window to stop", config.stop_key);
    match &args.snapshot {
        Some(path) => Ok(Box::new(SnapshotViewer::new(viewer, path))),
        None => Ok(Box::new(viewer)),
    }
}

#[cfg(not(feature = "opencv"))]
fn window_viewer(args: &Args, _config: &RunConfig) -> Result<Box<dyn Viewer>> {
    log::warn!("built without the opencv feature; no window available");
    Ok(headless_viewer(args))
}
