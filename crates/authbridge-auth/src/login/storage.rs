//! Persisted login state
//!
//! Three string values survive between steps of the login flow: the token
//! response, the decoded ID token claims, and the PKCE code verifier. None of
//! them expire on their own.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind as IoErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

/// Token endpoint response, as JSON
pub const TOKEN_RESPONSE_KEY: &str = "oidc_token_response";
/// Decoded ID token claims, as JSON
pub const ID_TOKEN_CLAIMS_KEY: &str = "oidc_id_token_claims";
/// PKCE code verifier of the pending login attempt
pub const CODE_VERIFIER_KEY: &str = "oidc_code_verifier";

/// Every key the login flow writes
pub const LOGIN_KEYS: [&str; 3] = [TOKEN_RESPONSE_KEY, ID_TOKEN_CLAIMS_KEY, CODE_VERIFIER_KEY];

/// Storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document is not a JSON string map
    #[error("Corrupt store: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// A value the current state depends on is absent
    #[error("Missing stored value: {0}")]
    Missing(&'static str),

    /// Another thread panicked while holding the store
    #[error("Store lock poisoned")]
    Poisoned,
}

/// String key-value storage for login state
pub trait LoginStore: Send + Sync + fmt::Debug {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value; absent keys are not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Delete every login key
    fn clear(&self) -> Result<(), StorageError> {
        for key in LOGIN_KEYS {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoginStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// Store backed by a JSON document on disk
///
/// The document is re-read on every access so separate processes (one per CLI
/// invocation) see each other's writes. Writes go through a temporary file
/// and a rename. Concurrent writers are not coordinated.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Use the document at `path`, created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("tmp");
        match std::fs::remove_file(&tmp) {
            Err(e) if e.kind() != IoErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        // Tokens live in this file: owner read/write only
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(values)?)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = values.len(), "Wrote login store");
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut values = self.read()?;
        apply(&mut values);
        self.write(&values)
    }
}

impl LoginStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}
