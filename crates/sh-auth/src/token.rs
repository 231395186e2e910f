//! Persisted session token storage
//!
//! The connection manager keeps exactly one token under a fixed key. Its
//! presence at connect time triggers session restoration.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sh_core::ShError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("Token store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Token store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<TokenStoreError> for ShError {
    fn from(err: TokenStoreError) -> Self {
        ShError::Config(err.to_string())
    }
}

/// Persistent key-value surface for the session token
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError>;

    fn set(&self, key: &str, token: &str) -> Result<(), TokenStoreError>;

    fn remove(&self, key: &str) -> Result<(), TokenStoreError>;
}

/// In-memory token store (tests and short-lived processes)
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token, as if left by an earlier session
    pub fn with_token(key: &str, token: &str) -> Self {
        let store = Self::new();
        store.tokens.write().insert(key.to_string(), token.to_string());
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError> {
        Ok(self.tokens.read().get(key).cloned())
    }

    fn set(&self, key: &str, token: &str) -> Result<(), TokenStoreError> {
        self.tokens.write().insert(key.to_string(), token.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        self.tokens.write().remove(key);
        Ok(())
    }
}

/// JSON file holding `{ key: token }`, used by the command-line client
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, TokenStoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, tokens: &HashMap<String, String>) -> Result<(), TokenStoreError> {
        if tokens.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
                _ => Ok(()),
            };
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(tokens)?)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError> {
        let _guard = self.lock.read();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, token: &str) -> Result<(), TokenStoreError> {
        let _guard = self.lock.write();
        let mut tokens = self.load()?;
        tokens.insert(key.to_string(), token.to_string());
        self.save(&tokens)?;
        tracing::debug!(path = %self.path.display(), "Session token persisted");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        let _guard = self.lock.write();
        let mut tokens = self.load()?;
        if tokens.remove(key).is_some() {
            self.save(&tokens)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.get("surrealToken").unwrap(), None);

        store.set("surrealToken", "abc").unwrap();
        assert_eq!(store.get("surrealToken").unwrap().as_deref(), Some("abc"));

        store.remove("surrealToken").unwrap();
        assert_eq!(store.get("surrealToken").unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = FileTokenStore::new(&path);

        assert_eq!(store.get("surrealToken").unwrap(), None);
        store.set("surrealToken", "abc").unwrap();
        assert!(path.exists());

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.get("surrealToken").unwrap().as_deref(), Some("abc"));

        reopened.remove("surrealToken").unwrap();
        assert_eq!(store.get("surrealToken").unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(matches!(store.get("surrealToken"), Err(TokenStoreError::Corrupt(_))));
    }
}
