//! Frame and region types shared across the pipeline.
//!
//! A `Frame` is one raw image pulled from the source: an owned, mutable RGB8
//! raster. Each frame is owned exclusively by the pipeline iteration that
//! pulled it, mutated in place by redaction and annotation, and dropped once
//! encoded. Frames are never shared or aliased across iterations.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// One raw video frame (RGB8, row-major).
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Build a frame from raw RGB8 bytes. Length must be `width * height * 3`.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let image = RgbImage::from_vec(width, height, data)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{} rgb8", width, height))?;
        Ok(Self { image })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGB8 bytes, row-major. Detectors read this; they never mutate it.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }
}

/// Pixel-space rectangle produced by a detector: `(x1, y1)` top-left,
/// `(x2, y2)` bottom-right, exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Intersect with frame bounds. Returns `None` when the clipped area is
    /// empty; callers treat that as a no-op, not an error.
    pub fn clip(&self, width: u32, height: u32) -> Option<ClippedRegion> {
        let x1 = self.x1.max(0);
        let y1 = self.y1.max(0);
        let x2 = self.x2.min(width as i32);
        let y2 = self.y2.min(height as i32);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some(ClippedRegion {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// A region guaranteed to lie inside frame bounds with non-zero area.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClippedRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
