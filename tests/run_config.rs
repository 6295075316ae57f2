use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;

use live_detect::config::CONFIG_ENV;
use live_detect::{
    BackendKind, ConfigOverrides, DevicePreference, FpsTiming, RunConfig, SizeWarning,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();
    guard
}

fn clear_env() {
    for key in [
        CONFIG_ENV,
        "LIVE_DETECT_MODEL",
        "LIVE_DETECT_BACKEND",
        "LIVE_DETECT_CAMERA",
        "LIVE_DETECT_DEVICE",
        "LIVE_DETECT_INPUT_SIZE",
        "LIVE_DETECT_CONFIDENCE",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_leave_input_size_unset() {
    let _guard = lock_env();

    let (cfg, warnings) = RunConfig::resolve(None, &ConfigOverrides::default()).expect("resolve");
    assert_eq!(cfg, RunConfig::default());
    assert!(!cfg.input_size_explicit);
    assert_eq!(cfg.input_size.get(), 640);
    assert_eq!(cfg.camera, "0");
    assert_eq!(cfg.stop_key, 'q');
    assert!(warnings.is_empty());
}

#[test]
fn file_then_env_then_cli_precedence() {
    let _guard = lock_env();
    let file = config_file(
        ".json",
        r#"{
            "model": { "path": "models/file.onnx", "backend": "stub" },
            "camera": { "source": "stub://file" },
            "inference": { "input_size": 700, "confidence": 0.3 }
        }"#,
    );

    std::env::set_var("LIVE_DETECT_CAMERA", "stub://env");
    std::env::set_var("LIVE_DETECT_CONFIDENCE", "0.4");
    let overrides = ConfigOverrides {
        confidence: Some(0.6),
        device: Some(DevicePreference::Cpu),
        ..ConfigOverrides::default()
    };

    let (cfg, warnings) = RunConfig::resolve(Some(file.path()), &overrides).expect("resolve");
    clear_env();

    assert_eq!(cfg.model_path, PathBuf::from("models/file.onnx"));
    assert_eq!(cfg.backend, BackendKind::Stub);
    assert_eq!(cfg.camera, "stub://env");
    assert_eq!(cfg.confidence, 0.6);
    assert_eq!(cfg.device, DevicePreference::Cpu);
    assert_eq!(cfg.input_size.get(), 672);
    assert!(cfg.input_size_explicit);
    assert_eq!(
        warnings,
        vec![SizeWarning::Adjusted {
            requested: 700,
            adjusted: 672
        }]
    );
}

#[test]
fn toml_display_section_is_applied() {
    let _guard = lock_env();
    let file = config_file(
        ".toml",
        r#"
            [display]
            fps_timing = "inference"
            stop_key = "x"
            window_title = "Bench"

            [inference]
            input_size = 1280
            verbose = true
        "#,
    );

    let (cfg, warnings) =
        RunConfig::resolve(Some(file.path()), &ConfigOverrides::default()).expect("resolve");
    assert_eq!(cfg.fps_timing, FpsTiming::InferenceSpan);
    assert_eq!(cfg.stop_key, 'x');
    assert_eq!(cfg.window_title, "Bench");
    assert_eq!(cfg.input_size.get(), 1280);
    assert!(cfg.verbose);
    assert!(warnings.is_empty());
}

#[test]
fn load_reads_config_path_from_env() {
    let _guard = lock_env();
    let file = config_file(".json", r#"{ "camera": { "source": "stub://from-env" } }"#);
    std::env::set_var(CONFIG_ENV, file.path());

    let cfg = RunConfig::load(&ConfigOverrides::default()).expect("load");
    clear_env();
    assert_eq!(cfg.camera, "stub://from-env");
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = lock_env();

    let file = config_file(".json", r#"{ "inference": { "confidence": 1.5 } }"#);
    assert!(RunConfig::resolve(Some(file.path()), &ConfigOverrides::default()).is_err());

    let tiny = ConfigOverrides {
        input_size: Some(16),
        ..ConfigOverrides::default()
    };
    assert!(RunConfig::resolve(None, &tiny).is_err());

    std::env::set_var("LIVE_DETECT_INPUT_SIZE", "large");
    let result = RunConfig::resolve(None, &ConfigOverrides::default());
    clear_env();
    assert!(result.is_err());

    let file = config_file(".json", r#"{ "display": { "stop_key": "quit" } }"#);
    assert!(RunConfig::resolve(Some(file.path()), &ConfigOverrides::default()).is_err());

    let missing = PathBuf::from("/nonexistent/live_detect.json");
    assert!(RunConfig::resolve(Some(missing.as_path()), &ConfigOverrides::default()).is_err());
}

#[test]
fn interactive_size_replaces_default() {
    let _guard = lock_env();
    let (cfg, _) = RunConfig::resolve(None, &ConfigOverrides::default()).expect("resolve");
    let size = live_detect::InputSize::new(1280).expect("size");
    let cfg = cfg.with_input_size(size);
    assert_eq!(cfg.input_size, size);
    assert!(cfg.input_size_explicit);
}
