//! JSON file sink with atomic whole-file replacement.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::store::StoreSnapshot;

use super::{DEFAULT_STORE_KEY, PersistError, PersistResult, SnapshotEnvelope, StateSink};

/// File implementation of [`crate::persist::StateSink`].
///
/// State lives in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStateSink {
    dir: PathBuf,
    key: String,
}

impl FileStateSink {
    /// Sink for the default `collections` key inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self::with_key(dir, DEFAULT_STORE_KEY)
    }

    /// Sink for an explicit store key inside `dir`.
    pub fn with_key(dir: impl AsRef<Path>, key: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            key: key.into(),
        }
    }

    /// Sink inside the platform data directory, e.g.
    /// `~/.local/share/<app_name>/collections.json` on Linux.
    pub fn in_data_dir(app_name: &str) -> PersistResult<Self> {
        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| PersistError::Message("no user data directory".to_string()))?;
        Ok(Self::open(base.join(app_name)))
    }

    /// Full path of the state file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.key))
    }

    /// Store key this sink reads and writes.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl StateSink for FileStateSink {
    fn load(&self) -> PersistResult<Option<StoreSnapshot>> {
        let bytes = match fs::read(self.path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let env = SnapshotEnvelope::decode(&bytes)?;
        Ok(Some(env.snapshot))
    }

    fn save(&mut self, snapshot: &StoreSnapshot) -> PersistResult<()> {
        let payload = SnapshotEnvelope::new(self.key.as_str(), snapshot.clone()).encode()?;
        fs::create_dir_all(&self.dir)?;

        // Same directory as the target so the final rename never crosses filesystems.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path()).map_err(|err| PersistError::Io(err.error))?;

        debug!(
            "saved {} collections ({} bytes) to {}",
            snapshot.collections.len(),
            payload.len(),
            self.path().display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}
