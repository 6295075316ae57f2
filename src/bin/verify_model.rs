//! verify_model - check that a model artifact loads and produces detections
//!
//! This tool proves:
//! - The ONNX file parses and optimizes for the requested input size
//! - Its outputs have a YOLO detection layout
//! - One inference on a known sample image completes
//!
//! Exit status is non-zero when any step fails.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use live_detect::{
    ingest::still::SAMPLE_IMAGE_URL,
    ui::{Ui, UiMode},
};

#[derive(Parser, Debug)]
#[cfg_attr(not(feature = "backend-tract"), allow(dead_code))]
#[command(
    name = "verify_model",
    about = "Load an ONNX detection model and run it once on a sample image"
)]
struct Args {
    /// ONNX model file
    #[arg(long, default_value = "yolo11n.onnx", value_name = "PATH")]
    model: PathBuf,

    /// Newline-separated class names for non-COCO models
    #[arg(long, value_name = "PATH")]
    labels: Option<PathBuf>,

    /// Sample image path or http(s) URL
    #[arg(long, default_value = SAMPLE_IMAGE_URL, value_name = "PATH|URL")]
    source: String,

    /// Square model input size; rounded down to a multiple of 32
    #[arg(long, default_value_t = 640, value_name = "PIXELS")]
    input_size: i64,

    /// Confidence threshold in [0, 1]
    #[arg(long, default_value_t = 0.25, value_name = "SCORE")]
    conf: f32,

    /// Also write the annotated sample here
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::for_stderr(args.ui);
    verify(&args, &ui)
}

#[cfg(feature = "backend-tract")]
fn verify(args: &Args, ui: &Ui) -> Result<()> {
    use anyhow::{anyhow, Context};
    use live_detect::{
        detect::TractBackend, ingest::still::load_still, DetectorBackend, DevicePreference,
        InferenceParams, InputSize,
    };

    if !(0.0..=1.0).contains(&args.conf) {
        return Err(anyhow!("--conf must be within [0, 1], got {}", args.conf));
    }
    let (input_size, warning) = InputSize::normalize(args.input_size)?;
    if let Some(warning) = warning {
        log::warn!("{}", warning);
    }

    println!("verify_model: checking {}", args.model.display());

    let stage = ui.stage("Load model");
    let mut backend = TractBackend::new(
        &args.model,
        input_size,
        DevicePreference::Cpu,
        args.labels.as_deref(),
    )?;
    stage.done();

    let summary = backend.summary().clone();
    println!("  input   {:?}", summary.input);
    for (index, shape) in summary.outputs.iter().enumerate() {
        println!("  output{} {:?}", index, shape);
    }
    println!("  classes {}", summary.num_classes);

    let stage = ui.stage("Fetch sample image");
    let frame = load_still(&args.source)?;
    stage.done_with(format!("{}x{}", frame.width(), frame.height()));

    let params = InferenceParams {
        confidence: args.conf,
        input_size,
        verbose: false,
    };
    let stage = ui.stage("Run inference");
    let result = backend.detect(&frame, &params)?;
    stage.done_with(result.summary());

    for detection in &result.detections {
        println!("  {:<14} {:.2}", detection.label, detection.confidence);
    }
    if let Some(out) = &args.out {
        result
            .plot(frame)
            .image()
            .save(out)
            .with_context(|| format!("write {}", out.display()))?;
        println!("verify_model: annotated sample written to {}", out.display());
    }
    println!("verify_model: OK ({} detections)", result.len());
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn verify(_args: &Args, _ui: &Ui) -> Result<()> {
    anyhow::bail!("verify_model requires the backend-tract feature")
}
