use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::Detection;
use crate::frame::Region;

/// Stub backend for development and tests. Uses pixel hashing to detect
/// scene changes and reports a single centered "person" when one occurs.
pub struct StubBackend {
    last_hash: Option<[u8; 32]>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { last_hash: None }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let current_hash: [u8; 32] = Sha256::digest(pixels).into();

        let motion = match self.last_hash {
            Some(prev) => prev != current_hash,
            None => false,
        };

        self.last_hash = Some(current_hash);

        if !motion {
            return Ok(Vec::new());
        }

        // Scene changed: report one subject covering the middle third.
        let w = width as i32;
        let h = height as i32;
        Ok(vec![Detection::new(
            "person",
            0.85,
            Region::new(w / 3, h / 3, w * 2 / 3, h * 2 / 3),
        )])
    }
}
