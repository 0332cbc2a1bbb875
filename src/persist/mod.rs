//! Persistence abstraction, snapshot envelope, and sink implementations.

pub mod file;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::store::{CollectionStore, StoreError, StoreSnapshot};

/// Version number for serialized [`SnapshotEnvelope`] payloads.
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

/// Store key used when none is given.
pub const DEFAULT_STORE_KEY: &str = "collections";

/// Failure to read or write persisted state.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Encoding or decoding failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Persisted payload was written by an unknown format version.
    #[error("unsupported snapshot format version {0}")]
    UnsupportedFormat(u16),
    /// Persisted payload decoded but is not a valid store state.
    #[error("invalid persisted state: {0}")]
    Store(#[from] StoreError),
    /// Any other failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Versioned wrapper around a [`StoreSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Logical store key the snapshot belongs to.
    pub key: String,
    /// Wrapped state.
    pub snapshot: StoreSnapshot,
}

impl SnapshotEnvelope {
    /// Wraps `snapshot` using [`SNAPSHOT_FORMAT_VERSION`].
    pub fn new(key: impl Into<String>, snapshot: StoreSnapshot) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            key: key.into(),
            snapshot,
        }
    }

    /// Encodes the envelope as JSON bytes.
    pub fn encode(&self) -> PersistResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes JSON bytes, rejecting other format versions.
    pub fn decode(payload: &[u8]) -> PersistResult<Self> {
        let env: Self = serde_json::from_slice(payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::UnsupportedFormat(env.format_version));
        }
        Ok(env)
    }
}

/// Whole-state persistence target.
pub trait StateSink: Send {
    /// Reads the last saved snapshot, or `None` when nothing was saved yet.
    fn load(&self) -> PersistResult<Option<StoreSnapshot>>;

    /// Replaces the persisted state with `snapshot`.
    ///
    /// Implementations must be atomic: on failure the previous state stays
    /// readable and intact.
    fn save(&mut self, snapshot: &StoreSnapshot) -> PersistResult<()>;

    /// Human-readable location, used in logs.
    fn describe(&self) -> String {
        "state sink".to_string()
    }
}

impl<T: StateSink + ?Sized> StateSink for Box<T> {
    fn load(&self) -> PersistResult<Option<StoreSnapshot>> {
        (**self).load()
    }

    fn save(&mut self, snapshot: &StoreSnapshot) -> PersistResult<()> {
        (**self).save(snapshot)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// How [`load_or_empty`] obtained its store.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Nothing was persisted yet.
    Fresh,
    /// Persisted state was loaded.
    Loaded {
        /// Number of records loaded.
        count: usize,
    },
    /// Persisted state could not be used and the store started empty.
    Recovered {
        /// Why the persisted state was discarded.
        error: PersistError,
    },
}

/// Loads the store from `sink`, falling back to an empty store on any failure.
pub fn load_or_empty<S: StateSink + ?Sized>(sink: &S) -> (CollectionStore, LoadOutcome) {
    let loaded = sink.load().and_then(|snap| {
        snap.map(CollectionStore::from_snapshot)
            .transpose()
            .map_err(PersistError::from)
    });

    match loaded {
        Ok(Some(store)) => {
            let count = store.len();
            info!("loaded {count} collections from {}", sink.describe());
            (store, LoadOutcome::Loaded { count })
        }
        Ok(None) => {
            info!("no persisted collections at {}, starting empty", sink.describe());
            (CollectionStore::new(), LoadOutcome::Fresh)
        }
        Err(error) => {
            warn!(
                "discarding unreadable collections at {}: {error}",
                sink.describe()
            );
            (CollectionStore::new(), LoadOutcome::Recovered { error })
        }
    }
}
