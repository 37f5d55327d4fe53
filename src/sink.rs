//! Detection event sink.
//!
//! The sink is the one point where persistence is allowed to decouple from
//! frame emission. Two modes:
//! - `StoreSink`: synchronous, blocks the loop until the append is
//!   acknowledged (the strict-durability mode).
//! - `WriterSink`: bounded queue plus a dedicated writer thread. `submit`
//!   waits at most the configured timeout, so a slow or failing store can
//!   delay the loop only by that bound; past it the append counts as failed
//!   and the frame still ships.
//!
//! Either way the pipeline issues exactly one submit per detection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Sender};

use crate::detect::Detection;
use crate::store::{DetectionStore, NewDetection};

pub trait DetectionSink: Send {
    /// Submit one detection for persistence. An `Err` means the record was
    /// not durably queued; the caller logs it and keeps the loop running.
    fn submit(&mut self, detection: &Detection) -> Result<()>;
}

/// Synchronous sink: one blocking store append per detection.
pub struct StoreSink<S: DetectionStore> {
    store: S,
}

impl<S: DetectionStore> StoreSink<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: DetectionStore> DetectionSink for StoreSink<S> {
    fn submit(&mut self, detection: &Detection) -> Result<()> {
        let id = self.store.append_detection(&NewDetection::from(detection))?;
        log::debug!(
            "detection #{} stored: {} {:.2}",
            id,
            detection.label,
            detection.confidence
        );
        Ok(())
    }
}

/// Background writer sink.
pub struct WriterSink {
    tx: Option<Sender<NewDetection>>,
    submit_timeout: Duration,
    appended: Arc<AtomicU64>,
    append_failures: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl WriterSink {
    /// Spawn the writer thread. `capacity` bounds the queue; `submit_timeout`
    /// bounds how long a submit may wait on a full queue.
    pub fn spawn(
        mut store: Box<dyn DetectionStore>,
        capacity: usize,
        submit_timeout: Duration,
    ) -> Result<Self> {
        let (tx, rx) = bounded::<NewDetection>(capacity.max(1));
        let appended = Arc::new(AtomicU64::new(0));
        let append_failures = Arc::new(AtomicU64::new(0));

        let appended_thread = appended.clone();
        let failures_thread = append_failures.clone();
        let join = std::thread::Builder::new()
            .name("veilcam-sink-writer".into())
            .spawn(move || {
                for record in rx {
                    match store.append_detection(&record) {
                        Ok(id) => {
                            appended_thread.fetch_add(1, Ordering::Relaxed);
                            log::debug!(
                                "detection #{} stored: {} {:.2}",
                                id,
                                record.object_name,
                                record.confidence
                            );
                        }
                        Err(err) => {
                            failures_thread.fetch_add(1, Ordering::Relaxed);
                            log::warn!("detection append failed: {}", err);
                        }
                    }
                }
            })
            .context("failed to spawn sink writer thread")?;

        Ok(Self {
            tx: Some(tx),
            submit_timeout,
            appended,
            append_failures,
            join: Some(join),
        })
    }

    /// Records successfully appended by the writer thread.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Store-level append failures observed by the writer thread.
    pub fn append_failures(&self) -> u64 {
        self.append_failures.load(Ordering::Relaxed)
    }

    /// Drain the queue and stop the writer thread.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        drop(self.tx.take());
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("sink writer thread panicked"))?;
        }
        Ok(())
    }
}

impl DetectionSink for WriterSink {
    fn submit(&mut self, detection: &Detection) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("sink writer already closed"))?;
        tx.send_timeout(NewDetection::from(detection), self.submit_timeout)
            .map_err(|_| {
                anyhow!(
                    "sink queue did not accept detection within {:?}",
                    self.submit_timeout
                )
            })
    }
}

impl Drop for WriterSink {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Region;
    use crate::store::InMemoryDetectionStore;
    use std::sync::Mutex;

    fn detection(label: &str) -> Detection {
        Detection::new(label, 0.75, Region::new(0, 0, 10, 10))
    }

    #[derive(Clone, Default)]
    struct SharedStore {
        records: Arc<Mutex<Vec<NewDetection>>>,
    }

    impl DetectionStore for SharedStore {
        fn append_detection(&mut self, record: &NewDetection) -> Result<i64> {
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(records.len() as i64)
        }
    }

    /// Blocks every append until released, to exercise the submit timeout.
    struct BlockingStore {
        release: crossbeam_channel::Receiver<()>,
    }

    impl DetectionStore for BlockingStore {
        fn append_detection(&mut self, _record: &NewDetection) -> Result<i64> {
            let _ = self.release.recv();
            Ok(1)
        }
    }

    #[test]
    fn store_sink_appends_synchronously() {
        let mut sink = StoreSink::new(InMemoryDetectionStore::new());
        sink.submit(&detection("person")).unwrap();
        sink.submit(&detection("dog")).unwrap();
        let store = sink.into_inner();
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.records()[0].object_name, "person");
    }

    #[test]
    fn writer_sink_persists_all_submitted_detections() {
        let store = SharedStore::default();
        let records = store.records.clone();
        let mut sink =
            WriterSink::spawn(Box::new(store), 16, Duration::from_millis(100)).unwrap();

        for label in ["person", "dog", "cat"] {
            sink.submit(&detection(label)).unwrap();
        }
        sink.close().unwrap();

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].object_name, "person");
        assert_eq!(records[2].object_name, "cat");
    }

    #[test]
    fn writer_sink_submit_times_out_instead_of_stalling() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let store = BlockingStore {
            release: release_rx,
        };
        let mut sink = WriterSink::spawn(Box::new(store), 1, Duration::from_millis(100)).unwrap();

        // First submit is taken by the writer (which then blocks in the
        // store); the second fills the queue; the third must time out.
        sink.submit(&detection("a")).unwrap();
        sink.submit(&detection("b")).unwrap();
        assert!(sink.submit(&detection("c")).is_err());

        // Unblock the writer so close() can drain.
        drop(release_tx);
        sink.close().unwrap();
    }
}
