use anyhow::Result;

use crate::detect::Detection;

/// Detector backend trait.
///
/// Backends wrap an opaque detection capability (a model, a heuristic, a
/// test script). Implementations must treat the pixel slice as read-only and
/// ephemeral: the slice is only valid for the duration of the call.
///
/// An `Err` from `detect` is unrecoverable for the pipeline instance that
/// owns the backend. Returning zero detections is not an error. Callers must
/// not rely on the ordering of returned detections beyond processing them in
/// the returned sequence.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Label resolution (class index to name) is
    /// internal to the backend; detections carry resolved labels.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
