//! Frame encoding.
//!
//! One encoder instance per pipeline; format (JPEG) and quality are fixed
//! for the pipeline lifetime. An encode failure is recoverable at the
//! pipeline level: the frame is skipped, never surfaced to the consumer.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;

use crate::frame::Frame;

/// JPEG frame encoder.
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Serialize a frame into a compressed JPEG buffer.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(anyhow!(
                "cannot encode {}x{} frame",
                frame.width(),
                frame.height()
            ));
        }
        let mut buffer = Vec::new();
        ImageJpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode_image(frame.image())
            .context("jpeg encode failed")?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_frame_to_jpeg_bytes() {
        let frame = Frame::from_rgb(vec![128u8; 16 * 16 * 3], 16, 16).unwrap();
        let bytes = JpegEncoder::new(80).encode(&frame).unwrap();
        // JPEG SOI marker.
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn rejects_zero_dimension_frames() {
        let frame = Frame::from_rgb(Vec::new(), 0, 0).unwrap();
        assert!(JpegEncoder::new(80).encode(&frame).is_err());
    }
}
