//! detect_image - run the detector once on a still image
//!
//! Loads an image from disk or an http(s) URL, runs one inference with the
//! same configuration layering as `live_detect`, prints the detections and
//! writes the annotated image.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use live_detect::{
    build_backend,
    ingest::still::{load_still, SAMPLE_IMAGE_URL},
    ui::{Ui, UiMode},
    ConfigOverrides, LoopSettings, RunConfig,
};

#[derive(Parser, Debug)]
#[command(name = "detect_image", about = "Detect objects in a single image")]
struct Args {
    /// Image path or http(s) URL
    #[arg(long, default_value = SAMPLE_IMAGE_URL, value_name = "PATH|URL")]
    source: String,

    /// Where to write the annotated image
    #[arg(long, default_value = "detections.jpg", value_name = "PATH")]
    out: PathBuf,

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

    /// Square model input size; rounded down to a multiple of 32
    #[arg(long, value_name = "PIXELS")]
    input_size: Option<i64>,

    /// Confidence threshold in [0, 1]
    #[arg(long, value_name = "SCORE")]
    conf: Option<f32>,

    /// Compute device (auto|cpu|cuda)
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::for_stderr(args.ui);

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        model_path: args.model.clone(),
        labels_path: args.labels.clone(),
        backend: args.backend.as_deref().map(str::parse).transpose()?,
        input_size: args.input_size,
        confidence: args.conf,
        device: args.device.as_deref().map(str::parse).transpose()?,
        ..ConfigOverrides::default()
    };
    let config = RunConfig::load(&overrides)?;
    let params = LoopSettings::from_config(&config).params;

    let stage = ui.stage("Load model");
    let mut detector = build_backend(&config)?;
    stage.done_with(format!("{} on {}", detector.name(), detector.device()));

    let stage = ui.stage("Load image");
    let frame = load_still(&args.source)?;
    stage.done_with(format!("{}x{}", frame.width(), frame.height()));

    let stage = ui.stage("Detect");
    let result = detector.detect(&frame, &params)?;
    stage.done_with(result.summary());

    println!("detect_image: {} ({} detections)", args.source, result.len());
    for detection in &result.detections {
        let b = detection.bbox;
        println!(
            "  {:<14} {:.2}  [{:.0}, {:.0}, {:.0}, {:.0}]",
            detection.label, detection.confidence, b.x1, b.y1, b.x2, b.y2
        );
    }

    let annotated = result.plot(frame);
    annotated
        .image()
        .save(&args.out)
        .with_context(|| format!("write {}", args.out.display()))?;
    println!("detect_image: annotated image written to {}", args.out.display());
    Ok(())
}
