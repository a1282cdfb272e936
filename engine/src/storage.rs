//! Durable key-value storage for record blobs.
//!
//! The engine only ever reads and writes whole blobs under fixed keys.
//! Backends decide where the bytes live.

use crate::{error::Result, Error};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A string-keyed blob store.
pub trait KeyValueStore {
    /// Read the blob stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the blob stored under `key`.
    fn set(&self, key: &str, blob: &str) -> Result<()>;

    /// Delete the blob stored under `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, blob: &str) -> Result<()> {
        (**self).set(key, blob)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, blob: &str) -> Result<()> {
        (**self).set(key, blob)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    blobs: HashMap<String, String>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory store. Reads and writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with one blob.
    pub fn with_blob(key: impl Into<String>, blob: impl Into<String>) -> Self {
        let store = Self::new();
        store.lock().blobs.insert(key.into(), blob.into());
        store
    }

    /// Make every subsequent read fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Raw blob under `key`, bypassing failure injection.
    pub fn blob(&self, key: &str) -> Option<String> {
        self.lock().blobs.get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(Error::storage(key, "read failed"));
        }
        Ok(inner.blobs.get(key).cloned())
    }

    fn set(&self, key: &str, blob: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(Error::storage(key, "write failed"));
        }
        inner.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(Error::storage(key, "write failed"));
        }
        inner.blobs.remove(key);
        Ok(())
    }
}

/// File-backed store: one `<key>.json` file per key inside a directory.
///
/// Writes land in a temporary sibling file first and are renamed into
/// place, so readers never see a half-written blob.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::storage(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    /// Directory holding the blobs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::storage(key, "invalid key"));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(key, e)),
        }
    }

    fn set(&self, key: &str, blob: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");

        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(blob.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::storage(key, e)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_get_set_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("notes").unwrap(), None);

        store.set("notes", r#"["a"]"#).unwrap();
        assert_eq!(store.get("notes").unwrap().as_deref(), Some(r#"["a"]"#));

        store.remove("notes").unwrap();
        assert_eq!(store.get("notes").unwrap(), None);
        store.remove("notes").unwrap();
    }

    #[test]
    fn memory_failure_injection() {
        let store = MemoryStore::with_blob("notes", "[]");

        store.fail_writes(true);
        assert!(matches!(
            store.set("notes", r#"["x"]"#),
            Err(Error::Storage { .. })
        ));
        assert_eq!(store.blob("notes").as_deref(), Some("[]"));

        store.fail_reads(true);
        assert!(store.get("notes").is_err());

        store.fail_reads(false);
        store.fail_writes(false);
        store.set("notes", r#"["x"]"#).unwrap();
        assert_eq!(store.get("notes").unwrap().as_deref(), Some(r#"["x"]"#));
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("data")).unwrap();

        assert_eq!(store.get("events").unwrap(), None);
        store.set("events", "[]").unwrap();
        assert_eq!(store.get("events").unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("data").join("events.json").exists());
        assert!(!dir.path().join("data").join("events.json.tmp").exists());

        store.set("events", r#"[{"date":"2024-03-10","description":"x"}]"#).unwrap();
        assert_eq!(
            store.get("events").unwrap().as_deref(),
            Some(r#"[{"date":"2024-03-10","description":"x"}]"#)
        );

        store.remove("events").unwrap();
        assert_eq!(store.get("events").unwrap(), None);
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(store.set("../escape", "[]").is_err());
        assert!(store.get("").is_err());
        assert!(store.get("a/b").is_err());
    }
}
