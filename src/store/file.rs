//! store::file
//!
//! JSON persistence for [`InMemoryStore`] and an exclusive lock on the
//! store file.
//!
//! # Storage
//!
//! - `<store>.json` - [`StoreSnapshot`] as pretty-printed JSON
//! - `<store>.json.lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - The lock is held for the whole load → run → save cycle of a command
//! - The lock is released on drop (RAII)
//! - Saves are atomic (write temp file, then rename)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use super::memory::{InMemoryStore, StoreSnapshot};
use super::traits::StoreError;

/// Errors from locking the store file.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("store '{0}' is locked by another relink process")]
    AlreadyLocked(PathBuf),

    /// Failed to create or open the lock file.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// An exclusive lock on a store file.
///
/// Released when dropped.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    file: Option<File>,
}

impl StoreLock {
    /// Attempt to lock `store_file`.
    ///
    /// Non-blocking: if another process holds the lock this returns
    /// [`LockError::AlreadyLocked`] immediately.
    pub fn acquire(store_file: &Path) -> Result<Self, LockError> {
        let path = Self::lock_path(store_file);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::AlreadyLocked(store_file.to_path_buf()))
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Path of the lock file guarding `store_file`.
    pub fn lock_path(store_file: &Path) -> PathBuf {
        let mut name = store_file.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Whether this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

/// Load a store from a JSON snapshot file.
pub fn load_store(path: &Path) -> Result<InMemoryStore, StoreError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&contents)
        .map_err(|e| StoreError::Io(format!("cannot parse {}: {}", path.display(), e)))?;
    InMemoryStore::from_snapshot(snapshot)
}

/// Write a store's committed content to `path` atomically.
pub fn save_store(store: &InMemoryStore, path: &Path) -> Result<(), StoreError> {
    let io_err = |p: &Path, e: std::io::Error| {
        StoreError::Io(format!("cannot write {}: {}", p.display(), e))
    };

    let contents = serde_json::to_string_pretty(&store.snapshot())
        .map_err(|e| StoreError::Io(format!("cannot serialize store: {e}")))?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = File::create(&temp_path).map_err(|e| io_err(&temp_path, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| io_err(&temp_path, e))?;
    file.sync_all().map_err(|e| io_err(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FieldValue;
    use crate::core::types::{FieldId, Language, Version};
    use crate::store::ContentStore;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_keeps_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("master.json");

        let en = Language::new("en").unwrap();
        let store = InMemoryStore::new("master");
        let a = store.add_root("a").unwrap();
        let b = store.add_child(&a, "b").unwrap();
        let v = store.add_version(&a, &en).unwrap();
        let field = FieldId::generate();
        store
            .set_field(&a, &en, v, field, FieldValue::Link(Some(b)))
            .unwrap();

        save_store(&store, &path).unwrap();
        let loaded = load_store(&path).unwrap();

        assert_eq!(loaded.name(), "master");
        assert_eq!(
            loaded.field(&a, &en, Version::new(1), &field),
            Some(FieldValue::Link(Some(b)))
        );
        assert!(!temp.path().join("master.json.tmp").exists());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            load_store(&temp.path().join("nope.json")),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn load_garbage_is_io_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_store(&path), Err(StoreError::Io(_))));
    }

    #[test]
    fn second_lock_fails_while_first_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("master.json");

        let first = StoreLock::acquire(&path).unwrap();
        assert!(first.is_held());
        assert!(matches!(
            StoreLock::acquire(&path),
            Err(LockError::AlreadyLocked(_))
        ));

        drop(first);
        assert!(StoreLock::acquire(&path).is_ok());
    }

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            StoreLock::lock_path(Path::new("/data/master.json")),
            PathBuf::from("/data/master.json.lock")
        );
    }
}
