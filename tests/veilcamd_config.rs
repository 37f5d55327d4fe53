use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use veilcam::config::VeilcamConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VEILCAM_CONFIG",
        "VEILCAM_STREAM_ADDR",
        "VEILCAM_SOURCE_URL",
        "VEILCAM_DB_PATH",
        "VEILCAM_DETECTOR_BACKEND",
        "VEILCAM_SENSITIVE_CLASSES",
        "VEILCAM_JPEG_QUALITY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VeilcamConfig::load().expect("load defaults");

    assert_eq!(cfg.db_path, "veilcam.db");
    assert_eq!(cfg.stream.addr, "127.0.0.1:8700");
    assert_eq!(cfg.source.url, "stub://camera0");
    assert_eq!(cfg.source.width, 640);
    assert_eq!(cfg.source.height, 480);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.redaction.sensitive_classes, vec!["person"]);
    assert_eq!(cfg.encoder.jpeg_quality, 80);

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "veilcam_prod.db",
        "stream": { "addr": "0.0.0.0:9000" },
        "source": {
            "url": "stub://garage",
            "target_fps": 12,
            "width": 800,
            "height": 600,
            "frame_limit": 500
        },
        "detector": { "backend": "stub", "confidence_threshold": 0.4 },
        "redaction": {
            "sensitive_classes": ["Person", "license plate"],
            "sigma_scale": 0.3,
            "sigma_min": 10.0
        },
        "encoder": { "jpeg_quality": 70 },
        "sink": { "queue_capacity": 16, "submit_timeout_ms": 25 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("VEILCAM_CONFIG", file.path());
    std::env::set_var("VEILCAM_SOURCE_URL", "stub://driveway");
    std::env::set_var("VEILCAM_JPEG_QUALITY", "55");

    let cfg = VeilcamConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "veilcam_prod.db");
    assert_eq!(cfg.stream.addr, "0.0.0.0:9000");
    assert_eq!(cfg.source.url, "stub://driveway");
    assert_eq!(cfg.source.target_fps, 12);
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.source.height, 600);
    assert_eq!(cfg.source.frame_limit, Some(500));
    assert_eq!(cfg.detector.backend, "stub");
    assert!((cfg.detector.confidence_threshold - 0.4).abs() < 1e-6);
    // Labels are validated and lowercased.
    assert_eq!(
        cfg.redaction.sensitive_classes,
        vec!["person", "license plate"]
    );
    assert_eq!(cfg.encoder.jpeg_quality, 55);
    assert_eq!(cfg.sink.queue_capacity, 16);
    assert_eq!(cfg.sink.submit_timeout, Duration::from_millis(25));

    clear_env();
}

#[test]
fn rejects_malformed_sensitive_classes() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VEILCAM_SENSITIVE_CLASSES", "person,bad/class");
    let err = VeilcamConfig::load().expect_err("slash is not a valid label");
    assert!(err.to_string().contains("class label"));

    clear_env();
}

#[test]
fn rejects_out_of_range_jpeg_quality() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VEILCAM_JPEG_QUALITY", "0");
    assert!(VeilcamConfig::load().is_err());

    clear_env();
}
