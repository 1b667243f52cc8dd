//! Attachment content storage
//!
//! Content is addressed by its blake3 digest, so identical uploads share one
//! blob and a stored blob never changes.

use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Where a blob ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub content_hash: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store content, returning its key. Storing the same bytes twice is a no-op.
    async fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    fn label(&self) -> &'static str;
}

pub fn content_key(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn check_key(key: &str) -> Result<(), StorageError> {
    if key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(StorageError::InvalidData(format!("invalid blob key '{key}'")))
    }
}

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StorageError> {
        let key = content_key(bytes);
        let mut blobs = self.blobs.write().await;
        blobs.entry(key.clone()).or_insert_with(|| bytes.to_vec());
        Ok(StoredBlob {
            content_hash: key.clone(),
            key,
            size_bytes: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        check_key(key)?;
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        check_key(key)?;
        let mut blobs = self.blobs.write().await;
        Ok(blobs.remove(key).is_some())
    }

    fn label(&self) -> &'static str {
        "memory"
    }
}

/// Blob store writing one file per blob under `root/<2 hex>/<digest>`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error(&root, e))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(&key[..2]).join(key)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Connection(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StorageError> {
        let key = content_key(bytes);
        let path = self.path_for(&key);
        let stored = StoredBlob {
            content_hash: key.clone(),
            key,
            size_bytes: bytes.len() as u64,
        };

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(stored);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| io_error(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        Ok(stored)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        check_key(key)?;
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        check_key(key)?;
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn label(&self) -> &'static str {
        "filesystem"
    }
}

/// Per-key mutexes that keep "store content, then reference it" and
/// "drop last reference, then remove content" from interleaving.
#[derive(Debug, Default)]
pub struct BlobKeyLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BlobKeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // Slots only the map still references are idle.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(
                slots
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        slot.lock_owned().await
    }

    pub async fn tracked_keys(&self) -> usize {
        self.slots.lock().await.len()
    }
}
