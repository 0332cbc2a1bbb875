//! SQLite-backed whole-state sink, one row per store key.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::core::store::StoreSnapshot;

use super::{DEFAULT_STORE_KEY, PersistResult, SnapshotEnvelope, StateSink};

/// SQLite implementation of [`crate::persist::StateSink`].
pub struct SqliteStateSink {
    conn: Connection,
    key: String,
}

impl SqliteStateSink {
    /// Opens or creates a SQLite-backed sink at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite sink.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    /// Switches the row this sink reads and writes.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn,
            key: DEFAULT_STORE_KEY.to_string(),
        })
    }

    /// Milliseconds timestamp of the last save for this key.
    pub fn last_saved_ms(&self) -> PersistResult<Option<u64>> {
        let ts: Option<i64> = self
            .conn
            .query_row(
                "SELECT updated_ms FROM store_state WHERE key = ?1",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts.map(|v| v as u64))
    }
}

impl StateSink for SqliteStateSink {
    fn load(&self) -> PersistResult<Option<StoreSnapshot>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM store_state WHERE key = ?1",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        Ok(Some(SnapshotEnvelope::decode(&payload)?.snapshot))
    }

    fn save(&mut self, snapshot: &StoreSnapshot) -> PersistResult<()> {
        let env = SnapshotEnvelope::new(self.key.as_str(), snapshot.clone());
        let payload = env.encode()?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO store_state(key, format_version, updated_ms, payload) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                format_version = excluded.format_version,
                updated_ms = excluded.updated_ms,
                payload = excluded.payload",
            params![self.key, env.format_version, now_ms() as i64, payload],
        )?;
        tx.commit()?;

        debug!(
            "saved {} collections under key {}",
            snapshot.collections.len(),
            self.key
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite key {}", self.key)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
