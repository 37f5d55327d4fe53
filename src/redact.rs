//! Privacy redaction.
//!
//! A detection whose label is in the configured sensitive-class set gets its
//! region destructively blurred before any annotation is drawn. The blur
//! strength scales with the region size so content stays unrecognizable for
//! both close-up and distant subjects; the exact kernel is a tunable, not a
//! contract.

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use image::imageops;

use crate::frame::{Frame, Region};

/// A conforming class label is a short lowercase identifier such as
/// "person" or "sports ball". We enforce a positive allowlist pattern so
/// config typos surface at startup rather than as never-matching classes.
pub fn validate_class_label(label: &str) -> Result<()> {
    // Compile once for hot paths.
    static LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = LABEL_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9 _-]{0,63}$").unwrap());

    let label = label.to_lowercase();
    if !re.is_match(&label) {
        return Err(anyhow!(
            "class label must match ^[a-z0-9][a-z0-9 _-]{{0,63}}$"
        ));
    }
    Ok(())
}

/// Detection labels that require redaction.
#[derive(Clone, Debug, Default)]
pub struct SensitiveClassSet {
    classes: Vec<String>,
}

impl SensitiveClassSet {
    pub fn new(classes: Vec<String>) -> Result<Self> {
        for class in &classes {
            validate_class_label(class)?;
        }
        Ok(Self {
            classes: classes.iter().map(|class| class.to_lowercase()).collect(),
        })
    }

    /// The default policy: redact people.
    pub fn person_only() -> Self {
        Self {
            classes: vec!["person".to_string()],
        }
    }

    pub fn is_sensitive(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.classes.iter().any(|class| class == &label)
    }

    /// The normalized (lowercased) labels in the set.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// In-place region blurrer.
pub struct Redactor {
    classes: SensitiveClassSet,
    sigma_scale: f32,
    sigma_min: f32,
}

impl Redactor {
    pub fn new(classes: SensitiveClassSet, sigma_scale: f32, sigma_min: f32) -> Self {
        Self {
            classes,
            sigma_scale,
            sigma_min,
        }
    }

    pub fn is_sensitive(&self, label: &str) -> bool {
        self.classes.is_sensitive(label)
    }

    /// Blur `region` in place. The region is clipped to frame bounds first;
    /// an empty clip is a no-op. Pixels outside the clipped region are left
    /// untouched.
    pub fn redact(&self, frame: &mut Frame, region: Region) -> Result<()> {
        let Some(clip) = region.clip(frame.width(), frame.height()) else {
            return Ok(());
        };

        let sigma = (clip.width.max(clip.height) as f32 * self.sigma_scale).max(self.sigma_min);
        let cropped =
            imageops::crop_imm(frame.image(), clip.x, clip.y, clip.width, clip.height).to_image();
        let blurred = imageops::blur(&cropped, sigma);
        imageops::replace(frame.image_mut(), &blurred, clip.x as i64, clip.y as i64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 7 % 256) as u8);
                data.push((y * 13 % 256) as u8);
                data.push(((x + y) * 29 % 256) as u8);
            }
        }
        Frame::from_rgb(data, width, height).unwrap()
    }

    fn redactor() -> Redactor {
        Redactor::new(SensitiveClassSet::person_only(), 0.2, 8.0)
    }

    #[test]
    fn blurs_inside_region_and_leaves_outside_untouched() {
        let mut frame = gradient_frame(64, 64);
        let before = frame.as_raw().to_vec();
        let region = Region::new(16, 16, 48, 48);

        redactor().redact(&mut frame, region).unwrap();

        let clip = region.clip(64, 64).unwrap();
        let mut changed_inside = false;
        for y in 0..64u32 {
            for x in 0..64u32 {
                let idx = ((y * 64 + x) * 3) as usize;
                let inside = x >= clip.x
                    && x < clip.x + clip.width
                    && y >= clip.y
                    && y < clip.y + clip.height;
                let same = frame.as_raw()[idx..idx + 3] == before[idx..idx + 3];
                if inside {
                    changed_inside |= !same;
                } else {
                    assert!(same, "pixel outside region changed at ({}, {})", x, y);
                }
            }
        }
        assert!(changed_inside, "redaction left the region untouched");
    }

    #[test]
    fn zero_area_region_is_a_noop() {
        let mut frame = gradient_frame(32, 32);
        let before = frame.as_raw().to_vec();

        // Entirely outside, inverted, and degenerate regions all clip empty.
        for region in [
            Region::new(100, 100, 120, 120),
            Region::new(20, 20, 10, 30),
            Region::new(5, 5, 5, 25),
        ] {
            redactor().redact(&mut frame, region).unwrap();
            assert_eq!(frame.as_raw(), before.as_slice());
        }
    }

    #[test]
    fn overhanging_region_blurs_only_the_inside_part() {
        let mut frame = gradient_frame(32, 32);
        let before = frame.as_raw().to_vec();

        redactor()
            .redact(&mut frame, Region::new(-10, -10, 8, 8))
            .unwrap();

        // Outside the clipped corner the frame is untouched.
        for y in 0..32u32 {
            for x in 0..32u32 {
                if x < 8 && y < 8 {
                    continue;
                }
                let idx = ((y * 32 + x) * 3) as usize;
                assert_eq!(frame.as_raw()[idx..idx + 3], before[idx..idx + 3]);
            }
        }
    }

    #[test]
    fn sensitive_set_matches_case_insensitively() {
        let set = SensitiveClassSet::new(vec!["person".into(), "license plate".into()]).unwrap();
        assert!(set.is_sensitive("person"));
        assert!(set.is_sensitive("Person"));
        assert!(set.is_sensitive("LICENSE PLATE"));
        assert!(!set.is_sensitive("dog"));
    }

    #[test]
    fn rejects_malformed_class_labels() {
        assert!(SensitiveClassSet::new(vec!["per/son".into()]).is_err());
        assert!(SensitiveClassSet::new(vec!["".into()]).is_err());
        assert!(validate_class_label("Person").is_ok());
    }
}
