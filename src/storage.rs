//! Pluggable blob storage for bulletin file contents.
//!
//! Blobs are addressed by `(bucket, key)`; bulletins use the parent folder
//! id as the bucket and the file's `location` as the key.
//!
//! ## Local backend
//!
//! Stores `<root>/<bucket>/<key>`. Bucket and key must each be a single
//! path component: empty names, `.`/`..`, separators, and null bytes are
//! rejected. Writes go to a temp file in the same directory and are renamed
//! into place, so readers never see partial content.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};

/// Monotonic counter to uniquify temp file names across concurrent writes.
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid storage name: {0:?}")]
    InvalidName(String),
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data`, replacing any existing blob.
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> StorageResult<()>;
    /// The blob, or `None` if it does not exist.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;
    /// Remove a blob. Removing a missing blob is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;
}

/// Build the backend selected by `config`.
pub fn from_config(config: &StorageConfig) -> Arc<dyn BlobStore> {
    match config.backend {
        StorageBackend::Local => {
            info!("Blob storage: local directory {}", config.root);
            Arc::new(LocalStore::new(&config.root))
        }
        StorageBackend::Memory => {
            info!("Blob storage: in-memory");
            Arc::new(MemoryStore::default())
        }
    }
}

/// Reject names that could escape their directory.
fn validate_component(name: &str) -> StorageResult<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(name)
}

/// Filesystem-backed store.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        Ok(self
            .root
            .join(validate_component(bucket)?)
            .join(validate_component(key)?))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let path = self.path_for(bucket, key)?;
        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir).await?;

        let seq = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = dir.join(format!(".kbserve_tmp_{}_{}", std::process::id(), seq));
        tokio::fs::write(&temp_path, &data).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let path = self.path_for(bucket, key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let k = (
            validate_component(bucket)?.to_string(),
            validate_component(key)?.to_string(),
        );
        self.blobs.write().await.insert(k, data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .blobs
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.blobs
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn BlobStore) {
        assert!(store.get("b1", "a.txt").await.unwrap().is_none());
        assert!(!store.exists("b1", "a.txt").await.unwrap());

        store.put("b1", "a.txt", b"one".to_vec()).await.unwrap();
        store.put("b1", "a.txt", b"two".to_vec()).await.unwrap();
        assert!(store.exists("b1", "a.txt").await.unwrap());
        assert_eq!(store.get("b1", "a.txt").await.unwrap().unwrap(), b"two");
        assert!(store.get("b2", "a.txt").await.unwrap().is_none());

        store.put("b1", "b.txt", b"keep".to_vec()).await.unwrap();
        store.delete("b1", "a.txt").await.unwrap();
        assert!(!store.exists("b1", "a.txt").await.unwrap());
        assert!(store.exists("b1", "b.txt").await.unwrap());
        store.delete("b1", "a.txt").await.unwrap();
        store.delete("b9", "never.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryStore::default()).await;
    }

    #[tokio::test]
    async fn test_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        exercise(&store).await;
        assert!(!dir.path().join("b1").join("a.txt").exists());
        let on_disk = std::fs::read(dir.path().join("b1").join("b.txt")).unwrap();
        assert_eq!(on_disk, b"keep");
        // No temp files left behind.
        let leftovers = std::fs::read_dir(dir.path().join("b1"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".kbserve_tmp_"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        for (bucket, key) in [("..", "x"), ("b", "../x"), ("b", ""), ("a/b", "x"), ("b", "x\0")] {
            assert!(matches!(
                store.put(bucket, key, vec![1]).await,
                Err(StorageError::InvalidName(_))
            ));
        }
        assert!(matches!(
            MemoryStore::default().put("b", "..", vec![]).await,
            Err(StorageError::InvalidName(_))
        ));
    }
}
