//! veilcam - privacy-redacting detection streamer.
//!
//! This crate implements the per-frame processing core of a live video
//! privacy system: capture -> inference -> redaction -> annotation ->
//! encoding -> emission, with concurrent persistence of detection events
//! and a continuous multipart stream toward a single remote viewer.
//!
//! # Module Structure
//!
//! - `source`: camera-like frame sources (synthetic, HTTP MJPEG)
//! - `detect`: object-detection backends (stub, tract/ONNX)
//! - `redact`: sensitive-class policy and in-place region blur
//! - `annotate`: bounding boxes and captions
//! - `encode`: JPEG encoding
//! - `store` / `sink`: durable detection records and the write decoupling
//! - `pipeline`: the per-frame orchestrator and its state machine
//! - `server`: the MJPEG streaming endpoint
//! - `config`: file + environment configuration surface

use anyhow::Result;
use rusqlite::{Connection, OpenFlags};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod annotate;
pub mod config;
pub mod detect;
pub mod encode;
pub mod frame;
pub mod pipeline;
pub mod redact;
pub mod server;
pub mod sink;
pub mod source;
pub mod store;

pub use annotate::Annotator;
pub use config::VeilcamConfig;
pub use detect::{open_detector, Detection, DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use encode::JpegEncoder;
pub use frame::{ClippedRegion, Frame, Region};
pub use pipeline::{multipart_chunk, Pipeline, PipelineState, PipelineStats, STREAM_BOUNDARY};
pub use redact::{validate_class_label, Redactor, SensitiveClassSet};
pub use server::{PipelineFactory, ServerHandle, StreamServer};
pub use sink::{DetectionSink, StoreSink, WriterSink};
#[cfg(feature = "source-http")]
pub use source::HttpSource;
pub use source::{open_source, FrameSource, SyntheticSource};
pub use store::{DetectionStore, InMemoryDetectionStore, NewDetection, SqliteDetectionStore};

/// A process-unique shared in-memory SQLite URI, for tests and embedders
/// that want several connections over one throwaway database.
pub fn shared_memory_uri() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "file:veilcam_{}_{}?mode=memory&cache=shared",
        std::process::id(),
        n
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
