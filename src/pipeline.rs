//! The per-frame stream pipeline.
//!
//! One logical worker drives capture -> inference -> redaction ->
//! annotation -> encoding -> emission, strictly in that order, one frame in
//! flight. Frame N+1 is not pulled until frame N has been fully yielded or
//! skipped.
//!
//! The pipeline is exposed as a lazy, unbounded, non-restartable iterator of
//! wire chunks; production is paced by the consumer pulling. Cancellation
//! (consumer disconnect, shutdown signal) is observed at the top of each
//! iteration, never mid-frame: in-flight redaction, annotation, and encoding
//! always complete before the stream ends.
//!
//! State machine: Idle -> Running -> {Draining, Faulted} -> Closed.
//! - exhausted source -> Draining (expected shutdown)
//! - source or detector fault -> Faulted (reported as stream termination)
//! - encode failure -> the frame is skipped, the loop continues
//! - sink failure -> logged and counted, the frame still ships

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::annotate::Annotator;
use crate::config::VeilcamConfig;
use crate::detect::{open_detector, DetectorBackend};
use crate::encode::JpegEncoder;
use crate::frame::Frame;
use crate::redact::{Redactor, SensitiveClassSet};
use crate::sink::DetectionSink;
use crate::source::{open_source, FrameSource};

/// Multipart boundary marker; fixed for the stream lifetime and mirrored by
/// the transport's Content-Type header.
pub const STREAM_BOUNDARY: &str = "frame";

/// Frames between health log lines.
const HEALTH_LOG_INTERVAL: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Faulted,
    Closed,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub frames_yielded: u64,
    pub frames_skipped: u64,
    pub detections: u64,
    pub sink_failures: u64,
}

pub struct Pipeline {
    source: Option<Box<dyn FrameSource>>,
    detector: Box<dyn DetectorBackend>,
    redactor: Redactor,
    annotator: Annotator,
    encoder: JpegEncoder,
    sink: Box<dyn DetectionSink>,
    cancel: Arc<AtomicBool>,
    state: PipelineState,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        redactor: Redactor,
        annotator: Annotator,
        encoder: JpegEncoder,
        sink: Box<dyn DetectionSink>,
    ) -> Self {
        Self {
            source: Some(source),
            detector,
            redactor,
            annotator,
            encoder,
            sink,
            cancel: Arc::new(AtomicBool::new(false)),
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        }
    }

    /// Wire a pipeline from configuration. The sink is passed in because its
    /// lifetime (writer thread, shared store) belongs to the caller's
    /// composition root.
    pub fn from_config(cfg: &VeilcamConfig, sink: Box<dyn DetectionSink>) -> Result<Self> {
        let source = open_source(&cfg.source)?;
        let mut detector = open_detector(&cfg.detector, cfg.source.width, cfg.source.height)?;
        detector.warm_up()?;
        let classes = SensitiveClassSet::new(cfg.redaction.sensitive_classes.clone())?;
        let redactor = Redactor::new(classes, cfg.redaction.sigma_scale, cfg.redaction.sigma_min);
        let encoder = JpegEncoder::new(cfg.encoder.jpeg_quality);
        Ok(Self::new(
            source,
            detector,
            redactor,
            Annotator::new(),
            encoder,
            sink,
        ))
    }

    /// Shared cancellation flag. Setting it ends the stream at the next
    /// iteration boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Terminal transition: drop the source handle. Safe to call more than
    /// once; the transport calls this when the consumer goes away.
    pub fn close(&mut self) {
        if self.state != PipelineState::Closed {
            self.source = None;
            self.state = PipelineState::Closed;
        }
    }

    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.state {
                PipelineState::Idle => self.state = PipelineState::Running,
                PipelineState::Running => {}
                PipelineState::Draining | PipelineState::Faulted | PipelineState::Closed => {
                    return None
                }
            }

            // Cancellation is observed here, between frames, and nowhere
            // else.
            if self.cancel.load(Ordering::SeqCst) {
                log::info!(
                    "pipeline cancelled after {} frames",
                    self.stats.frames_yielded
                );
                self.close();
                return None;
            }

            let source = self.source.as_mut()?;
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!(
                        "frame source exhausted after {} frames; draining",
                        self.stats.frames_yielded
                    );
                    self.state = PipelineState::Draining;
                    return None;
                }
                Err(err) => {
                    log::error!("frame source fault: {:#}", err);
                    self.state = PipelineState::Faulted;
                    return None;
                }
            };

            match self.process_frame(frame) {
                Ok(Some(chunk)) => {
                    self.stats.frames_yielded += 1;
                    if self.stats.frames_yielded % HEALTH_LOG_INTERVAL == 0 {
                        log::info!(
                            "pipeline health: yielded={} skipped={} detections={} sink_failures={}",
                            self.stats.frames_yielded,
                            self.stats.frames_skipped,
                            self.stats.detections,
                            self.stats.sink_failures
                        );
                    }
                    return Some(chunk);
                }
                Ok(None) => {
                    self.stats.frames_skipped += 1;
                    continue;
                }
                Err(err) => {
                    log::error!("detection fault: {:#}", err);
                    self.state = PipelineState::Faulted;
                    return None;
                }
            }
        }
    }

    /// Run one frame through the ordered stages. `Ok(None)` means the frame
    /// was skipped (encode failure, or a redaction error on a sensitive
    /// region - an unredacted sensitive frame must never ship).
    fn process_frame(&mut self, mut frame: Frame) -> Result<Option<Vec<u8>>> {
        let detections = self
            .detector
            .detect(frame.as_raw(), frame.width(), frame.height())?;

        for detection in &detections {
            self.stats.detections += 1;

            // Exactly one submit per detection; persistence failures never
            // gate emission.
            if let Err(err) = self.sink.submit(detection) {
                self.stats.sink_failures += 1;
                log::warn!(
                    "detection not persisted ({} {:.2}): {:#}",
                    detection.label,
                    detection.confidence,
                    err
                );
            }

            if self.redactor.is_sensitive(&detection.label) {
                if let Err(err) = self.redactor.redact(&mut frame, detection.region) {
                    log::warn!("redaction failed; dropping frame: {:#}", err);
                    return Ok(None);
                }
            }
            self.annotator.annotate(&mut frame, detection);
        }

        match self.encoder.encode(&frame) {
            Ok(jpeg) => Ok(Some(multipart_chunk(&jpeg))),
            Err(err) => {
                log::warn!("encode failed; skipping frame: {:#}", err);
                Ok(None)
            }
        }
    }
}

impl Iterator for Pipeline {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.next_chunk()
    }
}

/// Wire framing for one encoded frame: boundary marker, content-type header,
/// blank line, JPEG bytes, trailing separator.
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(jpeg.len() + 64);
    chunk.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_chunk_frames_the_payload() {
        let chunk = multipart_chunk(b"JPEG");
        assert_eq!(
            chunk,
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec()
        );
    }
}
