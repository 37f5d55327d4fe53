use anyhow::Result;

use crate::config::SourceSettings;
use crate::frame::Frame;
use crate::source::FrameSource;

/// Frames between synthetic scene changes.
const SCENE_CHANGE_INTERVAL: u64 = 50;

/// Synthetic frame source (`stub://` URLs).
///
/// Produces a deterministic moving gradient with a scene change every
/// `SCENE_CHANGE_INTERVAL` frames so the stub detector has something to
/// react to. An optional frame limit drives exhaustion, which is how tests
/// and demos exercise the draining path.
pub struct SyntheticSource {
    settings: SourceSettings,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        log::info!("frame source: {} (synthetic)", settings.url);
        Self {
            settings,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.settings.width * self.settings.height * 3) as usize;
        if self.frame_count % SCENE_CHANGE_INTERVAL == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.settings.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        let pixels = self.generate_pixels();
        self.frame_count += 1;
        let frame = Frame::from_rgb(pixels, self.settings.width, self.settings.height)?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(limit: Option<u64>) -> SourceSettings {
        SourceSettings {
            url: "stub://camera0".to_string(),
            target_fps: 10,
            width: 32,
            height: 24,
            frame_limit: limit,
        }
    }

    #[test]
    fn respects_frame_limit() {
        let mut source = SyntheticSource::new(settings(Some(2)));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        // Exhaustion is sticky.
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn frames_have_configured_dimensions() {
        let mut source = SyntheticSource::new(settings(None));
        let frame = source.next_frame().unwrap().expect("frame");
        assert_eq!(frame.width(), 32);
        assert_eq!(frame.height(), 24);
    }
}
