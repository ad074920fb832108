//! Filesystem-backed object storage
//!
//! Each key segment becomes a percent-encoded path component under the root.
//! Writes go to a temporary file that is fsynced and renamed into place, so a
//! reader never observes a partial object.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{check_key, ObjectStorage, StorageError, StorageResult};

const TMP_PREFIX: &str = ".tmp-";

/// Object storage rooted at a local directory
#[derive(Debug, Clone)]
pub struct PosixStorage {
    root: PathBuf,
}

impl PosixStorage {
    /// Open (and create if needed) a store rooted at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(StorageError::Config("empty posix store path".to_string()));
        }
        fs::create_dir_all(root).map_err(|e| {
            StorageError::Config(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        check_key(key)?;
        if key.split('/').any(|segment| segment.starts_with(TMP_PREFIX)) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(urlencoding::encode(segment).as_ref());
        }
        Ok(path)
    }

    fn put_blocking(path: &Path, data: &[u8]) -> StorageResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))?;
        fs::create_dir_all(parent)?;

        let tmp = parent.join(format!("{}{}", TMP_PREFIX, uuid::Uuid::new_v4().simple()));
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)?;
        // Persist the rename itself
        File::open(parent)?.sync_all()?;
        Ok(())
    }

    fn list_blocking(root: &Path, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![(root.to_path_buf(), String::new())];

        while let Some((dir, key_prefix)) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let entry = entry?;
                let raw_name = entry.file_name().to_string_lossy().into_owned();
                if raw_name.starts_with(TMP_PREFIX) {
                    continue;
                }
                let name = urlencoding::decode(&raw_name)
                    .map_err(|_| StorageError::InvalidKey(raw_name.clone()))?
                    .into_owned();
                let key = format!("{}{}", key_prefix, name);
                if entry.file_type()?.is_dir() {
                    stack.push((entry.path(), format!("{}/", key)));
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStorage for PosixStorage {
    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let path = self.object_path(key)?;
        tokio::task::spawn_blocking(move || Self::put_blocking(&path, &data))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || Self::list_blocking(&root, &prefix))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new(dir.path()).unwrap();

        storage.put("wal/0002.json", b"b".to_vec()).await.unwrap();
        storage.put("wal/0001.json", b"a".to_vec()).await.unwrap();
        storage.put("meta/name with space", b"m".to_vec()).await.unwrap();

        assert_eq!(storage.get("wal/0001.json").await.unwrap(), b"a");
        assert_eq!(
            storage.list("wal/").await.unwrap(),
            vec!["wal/0001.json", "wal/0002.json"]
        );
        assert_eq!(
            storage.list("meta/").await.unwrap(),
            vec!["meta/name with space"]
        );
        assert!(dir.path().join("meta").join("name%20with%20space").exists());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = PosixStorage::new(dir.path()).unwrap();
            storage.put("wal/1", b"one".to_vec()).await.unwrap();
        }
        let reopened = PosixStorage::new(dir.path()).unwrap();
        assert_eq!(reopened.get("wal/1").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new(dir.path()).unwrap();
        assert!(matches!(
            storage.get("wal/404").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete("wal/404").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(storage.list("wal/").await.unwrap().is_empty());
    }
}
