//! Frame sources.
//!
//! This module provides the sources the pipeline can pull frames from:
//! - Synthetic frames (`stub://` URLs, development and tests)
//! - HTTP MJPEG/JPEG network cameras (`http(s)://` URLs, feature: source-http)
//!
//! A source is a stateful, single-pass capability: it owns its device handle
//! exclusively, it is polled (never pushes), and once it reports exhaustion
//! it never produces frames again. Sources must not be iterated twice.
//!
//! The source URL doubles as the device selector from the configuration
//! surface; the scheme picks the implementation.

use anyhow::{anyhow, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;

#[cfg(feature = "source-http")]
pub mod http;
mod synthetic;

#[cfg(feature = "source-http")]
pub use http::HttpSource;
pub use synthetic::SyntheticSource;

/// A camera-like producer of raw frames.
pub trait FrameSource: Send {
    /// Pull the next frame.
    ///
    /// `Ok(None)` means the source is exhausted - a disconnected camera is
    /// normal termination, not an error. `Err` means the device reported a
    /// fault distinct from simply closing.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Open the source selected by `source.url`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    if settings.url.starts_with("http://") || settings.url.starts_with("https://") {
        #[cfg(feature = "source-http")]
        {
            return Ok(Box::new(HttpSource::new(settings.clone())?));
        }
        #[cfg(not(feature = "source-http"))]
        {
            return Err(anyhow!(
                "http sources require the source-http feature (url: {})",
                settings.url
            ));
        }
    }
    Err(anyhow!(
        "unsupported source url '{}'; expected stub:// or http(s)://",
        settings.url
    ))
}
