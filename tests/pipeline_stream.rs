//! End-to-end pipeline behavior: termination, record parity, sink failure
//! isolation, and the cancellation boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use veilcam::config::SourceSettings;
use veilcam::{
    Annotator, Detection, DetectionSink, DetectorBackend, FrameSource, JpegEncoder, Pipeline,
    PipelineState, Redactor, Region, SensitiveClassSet, SyntheticSource,
};

const CHUNK_PREFIX: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

fn synthetic_source(frames: u64) -> Box<dyn FrameSource> {
    Box::new(SyntheticSource::new(SourceSettings {
        url: "stub://test".into(),
        target_fps: 10,
        width: 64,
        height: 48,
        frame_limit: Some(frames),
    }))
}

/// Emits the same scripted detections for every frame. Optionally trips a
/// cancellation flag mid-frame, from inside detection.
struct ScriptedDetector {
    detections: Vec<Detection>,
    cancel_slot: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl ScriptedDetector {
    fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            cancel_slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<Detection>> {
        if let Some(flag) = self.cancel_slot.lock().unwrap().as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(self.detections.clone())
    }
}

struct FaultingDetector;

impl DetectorBackend for FaultingDetector {
    fn name(&self) -> &'static str {
        "faulting"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<Detection>> {
        Err(anyhow!("inference backend crashed"))
    }
}

struct FaultingSource;

impl FrameSource for FaultingSource {
    fn next_frame(&mut self) -> Result<Option<veilcam::Frame>> {
        Err(anyhow!("device reported an i/o error"))
    }
}

/// Records every submit attempt; optionally fails each one.
#[derive(Clone)]
struct RecordingSink {
    submits: Arc<Mutex<Vec<(String, f32)>>>,
    fail: bool,
}

impl RecordingSink {
    fn new(fail: bool) -> Self {
        Self {
            submits: Arc::new(Mutex::new(Vec::new())),
            fail,
        }
    }
}

impl DetectionSink for RecordingSink {
    fn submit(&mut self, detection: &Detection) -> Result<()> {
        self.submits
            .lock()
            .unwrap()
            .push((detection.label.clone(), detection.confidence));
        if self.fail {
            Err(anyhow!("sink is down"))
        } else {
            Ok(())
        }
    }
}

fn build_pipeline(
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    sink: Box<dyn DetectionSink>,
) -> Pipeline {
    Pipeline::new(
        source,
        detector,
        Redactor::new(SensitiveClassSet::person_only(), 0.2, 8.0),
        Annotator::new(),
        JpegEncoder::new(80),
        sink,
    )
}

fn assert_valid_chunk(chunk: &[u8]) {
    assert!(chunk.starts_with(CHUNK_PREFIX), "missing wire framing");
    assert!(chunk.ends_with(b"\r\n"), "missing trailing separator");
    let jpeg = &chunk[CHUNK_PREFIX.len()..chunk.len() - 2];
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "payload is not a jpeg");
}

#[test]
fn stream_yields_one_chunk_per_frame_then_terminates() {
    let detector = ScriptedDetector::new(vec![Detection::new(
        "person",
        0.9,
        Region::new(10, 10, 40, 40),
    )]);
    let mut pipeline = build_pipeline(
        synthetic_source(2),
        Box::new(detector),
        Box::new(RecordingSink::new(false)),
    );

    let chunks: Vec<Vec<u8>> = (&mut pipeline).collect();
    assert_eq!(chunks.len(), 2);
    for chunk in &chunks {
        assert_valid_chunk(chunk);
    }

    // Exhaustion drains the stream without surfacing an error, and the
    // sequence is not restartable.
    assert_eq!(pipeline.state(), PipelineState::Draining);
    assert!(pipeline.next().is_none());

    pipeline.close();
    assert_eq!(pipeline.state(), PipelineState::Closed);
}

#[test]
fn every_detection_is_submitted_exactly_once() {
    let detections = vec![
        Detection::new("person", 0.91, Region::new(5, 5, 25, 30)),
        Detection::new("dog", 0.62, Region::new(30, 8, 55, 40)),
        Detection::new("bicycle", 0.33, Region::new(0, 0, 12, 12)),
    ];
    let sink = RecordingSink::new(false);
    let submits = sink.submits.clone();
    let mut pipeline = build_pipeline(
        synthetic_source(2),
        Box::new(ScriptedDetector::new(detections.clone())),
        Box::new(sink),
    );

    assert_eq!(pipeline.by_ref().count(), 2);

    let submits = submits.lock().unwrap();
    assert_eq!(submits.len(), detections.len() * 2);
    for (i, (label, confidence)) in submits.iter().enumerate() {
        let expected = &detections[i % detections.len()];
        assert_eq!(label, &expected.label);
        assert_eq!(*confidence, expected.confidence);
    }
}

#[test]
fn failing_sink_is_invisible_to_the_stream_consumer() {
    let detections = vec![Detection::new("person", 0.8, Region::new(8, 8, 32, 32))];
    let sink = RecordingSink::new(true);
    let submits = sink.submits.clone();
    let mut pipeline = build_pipeline(
        synthetic_source(3),
        Box::new(ScriptedDetector::new(detections)),
        Box::new(sink),
    );

    let chunks: Vec<Vec<u8>> = (&mut pipeline).collect();
    assert_eq!(chunks.len(), 3, "sink failures must not drop frames");
    for chunk in &chunks {
        assert_valid_chunk(chunk);
    }

    // One submit was still issued per detection.
    assert_eq!(submits.lock().unwrap().len(), 3);
    assert_eq!(pipeline.stats().sink_failures, 3);
    assert_eq!(pipeline.state(), PipelineState::Draining);
}

#[test]
fn cancellation_mid_frame_still_yields_the_full_frame() {
    let detector = ScriptedDetector::new(vec![Detection::new(
        "person",
        0.9,
        Region::new(10, 10, 40, 40),
    )]);
    let cancel_slot = detector.cancel_slot.clone();
    let mut pipeline = build_pipeline(
        synthetic_source(100),
        Box::new(detector),
        Box::new(RecordingSink::new(false)),
    );

    // The detector trips cancellation while frame 1 is mid-processing.
    *cancel_slot.lock().unwrap() = Some(pipeline.cancel_flag());

    let first = pipeline.next().expect("frame 1 must be fully yielded");
    assert_valid_chunk(&first);

    // The signal takes effect at the next iteration boundary.
    assert!(pipeline.next().is_none());
    assert_eq!(pipeline.state(), PipelineState::Closed);
    assert_eq!(pipeline.stats().frames_yielded, 1);
}

#[test]
fn detector_fault_terminates_the_stream_without_panicking() {
    let mut pipeline = build_pipeline(
        synthetic_source(10),
        Box::new(FaultingDetector),
        Box::new(RecordingSink::new(false)),
    );

    assert!(pipeline.next().is_none());
    assert_eq!(pipeline.state(), PipelineState::Faulted);
}

#[test]
fn source_fault_is_distinguished_from_exhaustion() {
    let mut pipeline = build_pipeline(
        Box::new(FaultingSource),
        Box::new(ScriptedDetector::new(Vec::new())),
        Box::new(RecordingSink::new(false)),
    );

    assert!(pipeline.next().is_none());
    assert_eq!(pipeline.state(), PipelineState::Faulted);
}
