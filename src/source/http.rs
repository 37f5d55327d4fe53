#![cfg(feature = "source-http")]

//! HTTP network camera source.
//!
//! Supports cameras that stream MJPEG over a multipart HTTP response and
//! cameras that serve single JPEG snapshots. JPEG frames are decoded
//! in-memory and decimated to the configured target rate.
//!
//! A cleanly closed stream maps to exhaustion (`Ok(None)`); transport errors
//! after the connection is established map to a source fault.

use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use url::Url;

use crate::config::SourceSettings;
use crate::frame::Frame;
use crate::source::FrameSource;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// HTTP MJPEG/JPEG frame source.
pub struct HttpSource {
    settings: SourceSettings,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        let url = Url::parse(&settings.url).context("parse source url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported http source scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        Ok(Self {
            settings,
            stream: None,
            last_frame_at: None,
            frame_count: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.settings.url)
            .call()
            .context("connect to http camera")?;
        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            let reader = response.into_reader();
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(reader)));
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
        }
        log::info!("frame source: {} (http)", self.settings.url);
        Ok(())
    }
}

impl FrameSource for HttpSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.stream.is_none() {
            self.connect()?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(anyhow!("http source failed to connect"));
        };
        let min_interval = frame_interval(self.settings.target_fps);

        loop {
            let jpeg_bytes = match stream {
                HttpStream::Mjpeg(stream) => match stream.read_next_jpeg()? {
                    Some(bytes) => bytes,
                    // The camera closed the stream: exhaustion, not a fault.
                    None => return Ok(None),
                },
                HttpStream::SingleJpeg => fetch_single_jpeg(&self.settings.url)?,
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let (pixels, width, height) = decode_jpeg(&jpeg_bytes)?;
            self.frame_count += 1;
            self.last_frame_at = Some(now);

            return Ok(Some(Frame::from_rgb(pixels, width, height)?));
        }
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send + Sync>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Scan the multipart body for the next complete JPEG. `Ok(None)` when
    /// the stream ends cleanly.
    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn decode_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width, height))
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut start = None;
    let mut i = 0;
    while i + 1 < buffer.len() {
        if buffer[i] == 0xFF && buffer[i + 1] == 0xD8 {
            start = Some(i);
            break;
        }
        i += 1;
    }
    let start = start?;
    let mut j = start + 2;
    while j + 1 < buffer.len() {
        if buffer[j] == 0xFF && buffer[j + 1] == 0xD9 {
            return Some((start, j + 2));
        }
        j += 1;
    }
    None
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_jpeg_bounds_in_multipart_noise() {
        let mut buffer = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        let jpeg = [0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];
        buffer.extend_from_slice(&jpeg);
        buffer.extend_from_slice(b"\r\n--frame");

        let (start, end) = find_jpeg_bounds(&buffer).expect("bounds");
        assert_eq!(&buffer[start..end], &jpeg);
    }

    #[test]
    fn incomplete_jpeg_yields_nothing() {
        assert!(find_jpeg_bounds(&[0xFF, 0xD8, 0x01, 0x02]).is_none());
        assert!(find_jpeg_bounds(&[0x01, 0x02, 0xFF, 0xD9]).is_none());
    }
}
