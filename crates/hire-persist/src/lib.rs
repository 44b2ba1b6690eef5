//! # hire-persist
//!
//! JSON snapshot persistence. Each logical table is a single
//! `<dir>/<name>.json` file that is rewritten in full on every save.
//!
//! Writes go to a temporary sibling file first and are then renamed over the
//! target, so a crash mid-write leaves the previous snapshot intact.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by [`JsonStore`].
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem operation failed.
    #[error("io error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded or decoded.
    #[error("serialization error on {path}: {source}")]
    Serialization {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// A single JSON snapshot file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Creates a store for `<dir>/<name>.json`. Nothing is touched on disk.
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(format!("{name}.json")),
        }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, returning `T::default()` when the file is missing
    /// or unreadable. Unreadable files are logged.
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        match self.try_load() {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(error = %e, "failed to load snapshot, starting empty");
                T::default()
            }
        }
    }

    /// Loads the snapshot. `Ok(None)` means no snapshot exists yet.
    pub fn try_load<T: DeserializeOwned>(&self) -> Result<Option<T>, PersistError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let value = serde_json::from_slice(&bytes).map_err(|source| PersistError::Serialization {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(value))
    }

    /// Writes a full snapshot, replacing the previous one atomically.
    pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Serialization {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&json).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), bytes = json.len(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "feedback");
        let loaded: HashMap<String, u32> = store.load();
        assert!(loaded.is_empty());
        assert!(store.try_load::<HashMap<String, u32>>().expect("load").is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "agent_scores");

        let mut data = HashMap::new();
        data.insert("agent-1".to_string(), 7u32);
        store.save(&data).expect("save");

        assert_eq!(store.path(), dir.path().join("agent_scores.json"));
        let loaded: HashMap<String, u32> = store.load();
        assert_eq!(loaded.get("agent-1"), Some(&7));
    }

    #[test]
    fn save_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("state").join("reputation");
        let store = JsonStore::new(&nested, "feedback");
        store.save(&vec![1, 2, 3]).expect("save");
        assert!(nested.join("feedback.json").exists());
        assert!(!nested.join("feedback.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error_but_load_degrades() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path(), "feedback");
        fs::write(store.path(), b"{not json").expect("write");

        let err = store.try_load::<Vec<u32>>().expect_err("corrupt");
        assert!(matches!(err, PersistError::Serialization { .. }));
        let loaded: Vec<u32> = store.load();
        assert!(loaded.is_empty());
    }

    #[test]
    fn save_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a directory").expect("write");

        let store = JsonStore::new(&blocker, "feedback");
        let err = store.save(&vec![1]).expect_err("parent is a file");
        assert!(matches!(err, PersistError::Io { .. }));
    }
}
