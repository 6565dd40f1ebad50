//! Durable key-value storage for session state.
//!
//! The session manager and navigation gate persist a handful of string
//! values under well-known keys. The [`Storage`] trait mirrors a web
//! `localStorage` surface: synchronous, string-valued, best-effort. Write
//! failures are logged and swallowed; a lost write degrades to a fresh
//! login on the next start, never to an error surfaced mid-session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Key holding the bearer token.
pub const TOKEN_KEY: &str = "bingo_token";

/// Key holding the JSON snapshot of the signed-in user.
pub const USER_KEY: &str = "bingo_user";

/// Marker flag for the navigation gate's reload-once recovery.
pub const RELOAD_FLAG_KEY: &str = "vuetify:dynamic-reload";

/// Synchronous string key-value storage.
pub trait Storage: Send + Sync + 'static {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`. Best-effort.
    fn set(&self, key: &str, value: &str);

    /// Removes `key`. Removing an absent key is a no-op.
    fn remove(&self, key: &str);
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value);
    }

    fn remove(&self, key: &str) {
        (**self).remove(key);
    }
}

/// In-memory storage. Used by tests and by shells that manage persistence
/// themselves.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.map.lock().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.map.lock().remove(key);
    }
}

/// File-backed storage: a single JSON object persisted on every write.
///
/// A missing or unreadable file starts empty, and a failed persist is
/// logged and ignored.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Opens the storage file at `path`, loading any existing contents.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "storage file is not valid JSON, starting empty");
                    HashMap::new()
                }
            },
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no readable storage file, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    fn persist(&self, map: &HashMap<String, String>) {
        let raw = match serde_json::to_string_pretty(map) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to serialize storage contents");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, raw) {
            warn!(path = %self.path.display(), error = %err, "failed to persist storage file");
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = self.map.lock();
        map.insert(key.to_owned(), value.to_owned());
        self.persist(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = self.map.lock();
        if map.remove(key).is_some() {
            self.persist(&map);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(TOKEN_KEY), None);
        storage.set(TOKEN_KEY, "tok");
        assert_eq!(storage.get(TOKEN_KEY).as_deref(), Some("tok"));
        storage.remove(TOKEN_KEY);
        storage.remove(TOKEN_KEY);
        assert_eq!(storage.get(TOKEN_KEY), None);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("bingo-storage-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let storage = FileStorage::open(&path);
        storage.set(TOKEN_KEY, "tok");
        storage.set(USER_KEY, r#"{"id":"u1"}"#);
        drop(storage);

        let storage = FileStorage::open(&path);
        assert_eq!(storage.get(TOKEN_KEY).as_deref(), Some("tok"));
        storage.remove(USER_KEY);
        drop(storage);

        let storage = FileStorage::open(&path);
        assert_eq!(storage.get(USER_KEY), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = std::env::temp_dir().join(format!("bingo-storage-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        std::fs::write(&path, "not json {{{").unwrap();

        let storage = FileStorage::open(&path);
        assert_eq!(storage.get(TOKEN_KEY), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
