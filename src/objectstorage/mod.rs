//! Long-term store for WAL segments
//!
//! Blob storage behind a small async trait. `put` must not return before the
//! data is durable: the WAL relies on it to acknowledge appends.
//!
//! - `MemoryStorage`: volatile map, for tests and single-process runs
//! - `PosixStorage`: files under a root directory, fsynced on write

mod memory;
mod posix;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LtsConfig;

pub use memory::MemoryStorage;
pub use posix::PosixStorage;

/// Errors that can occur in long-term store operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

/// Result type for long-term store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable blob storage
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug {
    /// Store `data` under `key`, replacing any previous object
    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Read the object stored under `key`
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// List keys starting with `prefix`, in lexicographic order
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete the object stored under `key`
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Build the long-term store described by the configuration
pub fn new_lts(config: &LtsConfig) -> StorageResult<Arc<dyn ObjectStorage>> {
    match config {
        LtsConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
        LtsConfig::Posix { path } => Ok(Arc::new(PosixStorage::new(path)?)),
    }
}

/// Reject keys that cannot be mapped onto every backend
pub(crate) fn check_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("wal/00000000000000000001.json").is_ok());
        assert!(check_key("").is_err());
        assert!(check_key("wal//x").is_err());
        assert!(check_key("../etc/passwd").is_err());
        assert!(check_key("wal/").is_err());
    }

    #[test]
    fn test_new_lts_posix_rejects_empty_path() {
        let result = new_lts(&LtsConfig::Posix {
            path: std::path::PathBuf::new(),
        });
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
