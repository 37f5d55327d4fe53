use crate::frame::Region;

/// One object-detector output: class label, confidence score, bounding box
/// in frame pixel coordinates. Immutable after creation; consumed by the
/// redactor, the annotator, and the event sink.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    /// 0..=1
    pub confidence: f32,
    pub region: Region,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, region: Region) -> Self {
        Self {
            label: label.into(),
            confidence,
            region,
        }
    }
}
