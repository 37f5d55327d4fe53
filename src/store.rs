//! Detection persistence.
//!
//! The storage boundary is write-only: one append operation that takes the
//! durable projection of a detection and returns the storage-assigned id.
//! This subsystem never updates, deletes, or queries records.
//!
//! Appends are serialized by the owning thread (the sink's writer thread in
//! the daemon); callers treat each append as atomic.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::detect::Detection;
use crate::{now_s, open_db_connection};

/// The durable projection of a detection.
#[derive(Clone, Debug, PartialEq)]
pub struct NewDetection {
    pub object_name: String,
    pub confidence: f32,
}

impl From<&Detection> for NewDetection {
    fn from(detection: &Detection) -> Self {
        Self {
            object_name: detection.label.clone(),
            confidence: detection.confidence,
        }
    }
}

pub trait DetectionStore: Send {
    /// Append one detection record. Returns the storage-assigned id, which
    /// is unique and monotonically increasing.
    fn append_detection(&mut self, record: &NewDetection) -> Result<i64>;
}

/// SQLite-backed detection store.
pub struct SqliteDetectionStore {
    conn: Connection,
}

impl SqliteDetectionStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              object_name TEXT NOT NULL,
              confidence REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_created ON detections(created_at);
            "#,
        )?;
        Ok(())
    }
}

impl DetectionStore for SqliteDetectionStore {
    fn append_detection(&mut self, record: &NewDetection) -> Result<i64> {
        let created_at = now_s()? as i64;
        self.conn.execute(
            "INSERT INTO detections(created_at, object_name, confidence) VALUES (?1, ?2, ?3)",
            params![created_at, record.object_name, record.confidence],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

/// In-memory detection store mirroring the SQLite contract. Used by tests
/// and embedders that do not want durable storage.
#[derive(Debug, Default)]
pub struct InMemoryDetectionStore {
    records: Vec<NewDetection>,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[NewDetection] {
        &self.records
    }
}

impl DetectionStore for InMemoryDetectionStore {
    fn append_detection(&mut self, record: &NewDetection) -> Result<i64> {
        self.records.push(record.clone());
        Ok(self.records.len() as i64)
    }
}
