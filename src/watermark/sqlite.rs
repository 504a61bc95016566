use super::{Stream, WatermarkError, WatermarkStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite store
///
/// Schema:
/// ```sql
/// CREATE TABLE watermarks (
///     stream TEXT PRIMARY KEY,
///     last_id INTEGER NOT NULL,
///     updated_at INTEGER NOT NULL
/// )
/// ```
///
/// `synchronous=FULL` makes each committed upsert durable before `set`
/// returns, WAL mode included.
pub struct SqliteWatermarkStore {
    conn: Mutex<Connection>,
}

impl SqliteWatermarkStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, WatermarkError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS watermarks (
                stream TEXT PRIMARY KEY,
                last_id INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        log::info!("✅ SQLite watermark store initialized (journal_mode={})", mode);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl WatermarkStore for SqliteWatermarkStore {
    fn get(&self, stream: Stream) -> Result<u64, WatermarkError> {
        let conn = self.conn.lock().map_err(|_| WatermarkError::Poisoned)?;
        let last_id: Option<i64> = conn
            .query_row(
                "SELECT last_id FROM watermarks WHERE stream = ?1",
                params![stream.name()],
                |row| row.get(0),
            )
            .optional()?;
        match last_id {
            None => Ok(0),
            Some(id) => u64::try_from(id).map_err(|_| WatermarkError::OutOfRange(id.to_string())),
        }
    }

    fn set(&self, stream: Stream, last_id: u64) -> Result<(), WatermarkError> {
        // SQLite integers are signed 64-bit
        let stored = i64::try_from(last_id)
            .map_err(|_| WatermarkError::OutOfRange(last_id.to_string()))?;
        let conn = self.conn.lock().map_err(|_| WatermarkError::Poisoned)?;
        conn.execute(
            "INSERT INTO watermarks (stream, last_id, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(stream) DO UPDATE SET
                last_id = excluded.last_id,
                updated_at = excluded.updated_at",
            params![stream.name(), stored, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sqlite_roundtrip_and_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_path_buf();

        let store = SqliteWatermarkStore::open(&db_path).unwrap();
        assert_eq!(store.get(Stream::Battles).unwrap(), 0);

        store.set(Stream::Battles, 101).unwrap();
        store.set(Stream::Battles, 103).unwrap();
        store.set(Stream::Kills, 5).unwrap();
        drop(store);

        let reopened = SqliteWatermarkStore::open(&db_path).unwrap();
        assert_eq!(reopened.get(Stream::Battles).unwrap(), 103);
        assert_eq!(reopened.get(Stream::Kills).unwrap(), 5);
    }

    #[test]
    fn test_ids_beyond_integer_range_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = SqliteWatermarkStore::open(temp_file.path()).unwrap();

        store.set(Stream::Kills, 77).unwrap();
        let too_big = i64::MAX as u64 + 1;
        assert!(matches!(
            store.set(Stream::Kills, too_big),
            Err(WatermarkError::OutOfRange(_))
        ));
        assert_eq!(store.get(Stream::Kills).unwrap(), 77);

        store.set(Stream::Battles, i64::MAX as u64).unwrap();
        assert_eq!(store.get(Stream::Battles).unwrap(), i64::MAX as u64);
    }
}
