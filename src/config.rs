use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::redact::SensitiveClassSet;

const DEFAULT_DB_PATH: &str = "veilcam.db";
const DEFAULT_STREAM_ADDR: &str = "127.0.0.1:8700";
const DEFAULT_SOURCE_URL: &str = "stub://camera0";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_SENSITIVE_CLASS: &str = "person";
const DEFAULT_SIGMA_SCALE: f32 = 0.2;
const DEFAULT_SIGMA_MIN: f32 = 8.0;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_SINK_CAPACITY: usize = 64;
const DEFAULT_SINK_TIMEOUT_MS: u64 = 50;

#[derive(Debug, Deserialize, Default)]
struct VeilcamConfigFile {
    db_path: Option<String>,
    stream: Option<StreamConfigFile>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    redaction: Option<RedactionConfigFile>,
    encoder: Option<EncoderConfigFile>,
    sink: Option<SinkConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    frame_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RedactionConfigFile {
    sensitive_classes: Option<Vec<String>>,
    sigma_scale: Option<f32>,
    sigma_min: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct EncoderConfigFile {
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct SinkConfigFile {
    queue_capacity: Option<usize>,
    submit_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct VeilcamConfig {
    pub db_path: String,
    pub stream: StreamSettings,
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub redaction: RedactionSettings,
    pub encoder: EncoderSettings,
    pub sink: SinkSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub addr: String,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Device selector: `stub://...` or `http(s)://...`; the scheme picks
    /// the source implementation.
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Synthetic sources only: stop after this many frames.
    pub frame_limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct RedactionSettings {
    pub sensitive_classes: Vec<String>,
    pub sigma_scale: f32,
    pub sigma_min: f32,
}

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
}

impl VeilcamConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEILCAM_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VeilcamConfigFile) -> Self {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let stream = StreamSettings {
            addr: file
                .stream
                .and_then(|stream| stream.addr)
                .unwrap_or_else(|| DEFAULT_STREAM_ADDR.to_string()),
        };
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
            frame_limit: file.source.as_ref().and_then(|source| source.frame_limit),
        };
        let detector = DetectorSettings {
            backend: file
                .detector
                .as_ref()
                .and_then(|detector| detector.backend.clone())
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            model_path: file
                .detector
                .as_ref()
                .and_then(|detector| detector.model_path.clone()),
            labels_path: file
                .detector
                .as_ref()
                .and_then(|detector| detector.labels_path.clone()),
            confidence_threshold: file
                .detector
                .as_ref()
                .and_then(|detector| detector.confidence_threshold)
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };
        let redaction = RedactionSettings {
            sensitive_classes: file
                .redaction
                .as_ref()
                .and_then(|redaction| redaction.sensitive_classes.clone())
                .unwrap_or_else(|| vec![DEFAULT_SENSITIVE_CLASS.to_string()]),
            sigma_scale: file
                .redaction
                .as_ref()
                .and_then(|redaction| redaction.sigma_scale)
                .unwrap_or(DEFAULT_SIGMA_SCALE),
            sigma_min: file
                .redaction
                .as_ref()
                .and_then(|redaction| redaction.sigma_min)
                .unwrap_or(DEFAULT_SIGMA_MIN),
        };
        let encoder = EncoderSettings {
            jpeg_quality: file
                .encoder
                .and_then(|encoder| encoder.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        };
        let sink = SinkSettings {
            queue_capacity: file
                .sink
                .as_ref()
                .and_then(|sink| sink.queue_capacity)
                .unwrap_or(DEFAULT_SINK_CAPACITY),
            submit_timeout: Duration::from_millis(
                file.sink
                    .as_ref()
                    .and_then(|sink| sink.submit_timeout_ms)
                    .unwrap_or(DEFAULT_SINK_TIMEOUT_MS),
            ),
        };
        Self {
            db_path,
            stream,
            source,
            detector,
            redaction,
            encoder,
            sink,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("VEILCAM_STREAM_ADDR") {
            if !addr.trim().is_empty() {
                self.stream.addr = addr;
            }
        }
        if let Ok(url) = std::env::var("VEILCAM_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(db_path) = std::env::var("VEILCAM_DB_PATH") {
            if !db_path.trim().is_empty() {
                self.db_path = db_path;
            }
        }
        if let Ok(backend) = std::env::var("VEILCAM_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
        if let Ok(classes) = std::env::var("VEILCAM_SENSITIVE_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.redaction.sensitive_classes = parsed;
            }
        }
        if let Ok(quality) = std::env::var("VEILCAM_JPEG_QUALITY") {
            let quality: u8 = quality
                .parse()
                .map_err(|_| anyhow!("VEILCAM_JPEG_QUALITY must be an integer in 1..=100"))?;
            self.encoder.jpeg_quality = quality;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.detector.backend.trim().is_empty() {
            return Err(anyhow!("detector.backend must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("detector.confidence_threshold must be in 0..=1"));
        }

        // Normalizes (lowercases) and validates every label.
        let classes = SensitiveClassSet::new(self.redaction.sensitive_classes.clone())?;
        self.redaction.sensitive_classes = classes.classes().to_vec();

        if self.redaction.sigma_min <= 0.0 {
            return Err(anyhow!("redaction.sigma_min must be greater than zero"));
        }
        if self.redaction.sigma_scale < 0.0 {
            return Err(anyhow!("redaction.sigma_scale must not be negative"));
        }
        if !(1..=100).contains(&self.encoder.jpeg_quality) {
            return Err(anyhow!("encoder.jpeg_quality must be in 1..=100"));
        }
        if self.sink.queue_capacity == 0 {
            return Err(anyhow!("sink.queue_capacity must be at least 1"));
        }
        if self.sink.submit_timeout.is_zero() {
            return Err(anyhow!("sink.submit_timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VeilcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
