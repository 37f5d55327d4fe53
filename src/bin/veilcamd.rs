//! veilcamd - privacy-redacting detection stream daemon.
//!
//! This daemon:
//! 1. Loads configuration (JSON file + environment overrides)
//! 2. Serves the MJPEG endpoint; each viewer gets a freshly wired pipeline
//!    (source -> detector -> redactor -> annotator -> encoder) with its own
//!    background sink writer into the detection store
//! 3. Shuts down cleanly on Ctrl-C

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use veilcam::{
    DetectionSink, Pipeline, SqliteDetectionStore, StreamServer, VeilcamConfig, WriterSink,
};

#[derive(Parser, Debug)]
#[command(
    name = "veilcamd",
    version,
    about = "privacy-redacting detection stream daemon"
)]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "VEILCAM_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = VeilcamConfig::load_from(args.config.as_deref())?;

    log::info!("veilcamd {} starting", env!("CARGO_PKG_VERSION"));
    log::info!(
        "source={} detector={} sensitive_classes={:?} db={}",
        cfg.source.url,
        cfg.detector.backend,
        cfg.redaction.sensitive_classes,
        cfg.db_path
    );

    // One pipeline per viewer. Each gets its own store connection behind its
    // own writer thread; SQLite serializes the appends.
    let factory_cfg = cfg.clone();
    let factory = Box::new(move || -> Result<Pipeline> {
        let store = SqliteDetectionStore::open(&factory_cfg.db_path)?;
        let sink: Box<dyn DetectionSink> = Box::new(WriterSink::spawn(
            Box::new(store),
            factory_cfg.sink.queue_capacity,
            factory_cfg.sink.submit_timeout,
        )?);
        Pipeline::from_config(&factory_cfg, sink)
    });

    let handle = StreamServer::new(cfg.stream.addr.clone(), factory).spawn()?;
    log::info!("stream endpoint listening on http://{}", handle.addr);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })?;

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutting down");
    handle.stop()?;
    Ok(())
}
