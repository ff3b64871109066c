//! Durable client-side key/value storage.
//!
//! The session keeps two keys here: the offline queue (a JSON array of
//! envelopes) and the last joined room. Calls are synchronous and small;
//! the file store writes through a temp file + rename so a crash mid-write
//! leaves the previous value intact.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use dashmap::DashMap;

use chatwire_core::error::{ChatwireError, Result};

pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store (tests, ephemeral sessions).
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ChatwireError::Storage(format!("create {} failed: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // keys are config-controlled, but keep them inside `dir` regardless
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChatwireError::Storage(format!("read {key} failed: {e}"))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .map_err(|e| ChatwireError::Storage(format!("write {key} failed: {e}")))?;
        fs::rename(&tmp, &path)
            .map_err(|e| ChatwireError::Storage(format!("commit {key} failed: {e}")))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChatwireError::Storage(format!("remove {key} failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested")).unwrap();

        assert_eq!(store.get("chatwire.offline_queue").unwrap(), None);
        store.set("chatwire.offline_queue", "[1,2]").unwrap();
        assert_eq!(store.get("chatwire.offline_queue").unwrap().as_deref(), Some("[1,2]"));

        store.set("chatwire.offline_queue", "[]").unwrap();
        assert_eq!(store.get("chatwire.offline_queue").unwrap().as_deref(), Some("[]"));

        store.remove("chatwire.offline_queue").unwrap();
        store.remove("chatwire.offline_queue").unwrap();
        assert_eq!(store.get("chatwire.offline_queue").unwrap(), None);
    }

    #[test]
    fn file_store_keys_stay_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.set("../escape/key", "x").unwrap();
        assert_eq!(store.path_for("../escape/key").parent(), Some(dir.path()));
        assert_eq!(store.get("../escape/key").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn memory_store_basics() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }
}
