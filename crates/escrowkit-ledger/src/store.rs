//! Key-value persistence area.

use std::collections::HashMap;
use std::path::Path;

use escrowkit_types::EscrowError;
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Store is read-only")]
    ReadOnly,
}

impl From<StoreError> for EscrowError {
    fn from(e: StoreError) -> Self {
        EscrowError::storage(e.to_string())
    }
}

/// Byte-oriented key-value store
pub trait RecordStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrite the value under `key`
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Block until earlier writes are durable
    fn flush(&self) -> Result<(), StoreError>;
}

/// Embedded on-disk store
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create the database directory at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Opened approval store");
        Ok(Self { db })
    }
}

impl RecordStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.db.remove(key.as_bytes())?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    read_only: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with [`StoreError::ReadOnly`]
    pub fn set_read_only(&self, read_only: bool) {
        *self.read_only.write() = read_only;
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *self.read_only.read() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.put("k", b"v").unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_store_read_only() {
        let store = MemoryStore::new();
        store.put("k", b"1").unwrap();
        store.set_read_only(true);
        assert!(matches!(store.put("k", b"2"), Err(StoreError::ReadOnly)));
        assert_eq!(store.get("k").unwrap(), Some(b"1".to_vec()));
    }
}
