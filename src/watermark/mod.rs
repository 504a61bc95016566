//! Watermark storage
//!
//! One `lastId` per stream, durably persisted before `set` returns.
//!
//! Backends:
//! - `json_file` - `{"recents": {"battleId": n, "eventId": n}}` rewritten atomically
//! - `sqlite` - `watermarks` table with `synchronous=FULL`
//! - `MemoryWatermarkStore` - process-local, for tests
//!
//! Single writer per stream is assumed; the scheduler is that writer.

pub mod json_file;
pub mod sqlite;

use crate::config::StoreBackend;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use json_file::JsonFileWatermarkStore;
pub use sqlite::SqliteWatermarkStore;

/// Ingestion stream owning a watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Battles,
    Kills,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Stream::Battles => "battles",
            Stream::Kills => "kills",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("watermark store lock poisoned")]
    Poisoned,
    #[error("watermark {0} does not fit the store's integer range")]
    OutOfRange(String),
}

/// Durable stream → last processed id mapping
pub trait WatermarkStore: Send + Sync {
    /// Last persisted id for `stream`, 0 if never set
    fn get(&self, stream: Stream) -> Result<u64, WatermarkError>;

    /// Persist `last_id`; returns only once the value is durable
    fn set(&self, stream: Stream, last_id: u64) -> Result<(), WatermarkError>;

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

/// Open the configured backend at `path`
pub fn open_store(
    backend: StoreBackend,
    path: impl AsRef<Path>,
) -> Result<Arc<dyn WatermarkStore>, WatermarkError> {
    let store: Arc<dyn WatermarkStore> = match backend {
        StoreBackend::Json => Arc::new(JsonFileWatermarkStore::open(path)?),
        StoreBackend::Sqlite => Arc::new(SqliteWatermarkStore::open(path)?),
    };
    Ok(store)
}

/// In-memory store; also counts writes so tests can assert on persistence
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    marks: Mutex<HashMap<Stream, u64>>,
    writes: Mutex<Vec<(Stream, u64)>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marks(battles: u64, kills: u64) -> Self {
        let store = Self::default();
        if let Ok(mut marks) = store.marks.lock() {
            marks.insert(Stream::Battles, battles);
            marks.insert(Stream::Kills, kills);
        }
        store
    }

    /// Every `set` call in order
    pub fn writes(&self) -> Vec<(Stream, u64)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn get(&self, stream: Stream) -> Result<u64, WatermarkError> {
        let marks = self.marks.lock().map_err(|_| WatermarkError::Poisoned)?;
        Ok(marks.get(&stream).copied().unwrap_or(0))
    }

    fn set(&self, stream: Stream, last_id: u64) -> Result<(), WatermarkError> {
        self.marks
            .lock()
            .map_err(|_| WatermarkError::Poisoned)?
            .insert(stream, last_id);
        self.writes
            .lock()
            .map_err(|_| WatermarkError::Poisoned)?
            .push((stream, last_id));
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
