//! Object detection backends.
//!
//! A backend wraps the detection capability behind `DetectorBackend`. The
//! pipeline owns exactly one backend instance; which one is chosen by the
//! `detector.backend` configuration key:
//! - `stub`: hash-based scene-change stub (development, tests)
//! - `tract`: ONNX inference via tract (feature: backend-tract)

#[cfg(feature = "backend-tract")]
use std::path::Path;

use anyhow::{anyhow, Result};

mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::Detection;

use crate::config::DetectorSettings;

/// Build the configured detector backend. The frame dimensions come from the
/// source settings; model-backed backends reject frames of any other size.
pub fn open_detector(
    settings: &DetectorSettings,
    width: u32,
    height: u32,
) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                let model_path = settings.model_path.as_ref().ok_or_else(|| {
                    anyhow!("detector.model_path is required for the tract backend")
                })?;
                let labels = match &settings.labels_path {
                    Some(path) => load_labels(path)?,
                    None => Vec::new(),
                };
                let backend = TractBackend::new(model_path, width, height, labels)?
                    .with_threshold(settings.confidence_threshold);
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                let _ = (width, height);
                Err(anyhow!(
                    "the tract backend requires the backend-tract feature"
                ))
            }
        }
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

/// One class name per line, blank lines skipped.
#[cfg(feature = "backend-tract")]
fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read labels file {}: {}", path.display(), e))?;
    Ok(raw
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect())
}
