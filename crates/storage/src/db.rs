//! sled database wrapper with serialization helpers.

use keyto_core::Hash;
use sled::Db;
use std::path::Path;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error("Block {index} does not extend stored head: {reason}")]
    LinkMismatch { index: u64, reason: String },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Wrapper around sled database with serialization helpers.
///
/// Cloning is cheap: clones share the same underlying database.
#[derive(Clone)]
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a serializable value.
    pub fn put<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    /// Retrieve and deserialize a value.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Apply multiple operations atomically.
    ///
    /// Note: Atomicity is provided by sled's `apply_batch`. The batch
    /// collects operations in memory, then `apply_batch` writes them
    /// atomically using sled's write-ahead log (WAL).
    pub fn batch(&self, operations: Vec<BatchOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in operations {
            match op {
                BatchOp::Insert { key, value } => batch.insert(key, value),
                BatchOp::Remove { key } => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Serialize a value into an insert operation for [`Storage::batch`].
    pub fn insert_op<V: serde::Serialize>(key: Vec<u8>, value: &V) -> Result<BatchOp> {
        Ok(BatchOp::Insert {
            key,
            value: bincode::serialize(value)?,
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    /// Create a prefixed key for blocks by height.
    /// Format: "block:height:" + big-endian height, so keys sort by height.
    pub fn block_height_key(height: u64) -> Vec<u8> {
        let mut key = b"block:height:".to_vec();
        key.extend_from_slice(&height.to_be_bytes());
        key
    }

    /// Create a prefixed key for blocks by hash.
    /// Format: "block:hash:" + hash_bytes
    pub fn block_hash_key(hash: &Hash) -> Vec<u8> {
        let mut key = b"block:hash:".to_vec();
        key.extend_from_slice(&hash.0);
        key
    }
}

/// Batch operation for atomic updates.
pub enum BatchOp {
    Insert { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_temporary() {
        let storage = Storage::open_temporary().unwrap();
        assert!(storage.db.is_empty());
    }

    #[test]
    fn test_put_get() {
        let storage = Storage::open_temporary().unwrap();

        storage.put("key1", &42u64).unwrap();

        let value: Option<u64> = storage.get("key1").unwrap();
        assert_eq!(value, Some(42));

        let missing: Option<u64> = storage.get("missing").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_batch_operations() {
        let storage = Storage::open_temporary().unwrap();

        let ops = vec![
            Storage::insert_op(b"a".to_vec(), &1u64).unwrap(),
            Storage::insert_op(b"b".to_vec(), &2u64).unwrap(),
        ];
        storage.batch(ops).unwrap();

        let a: u64 = storage.get("a").unwrap().unwrap();
        let b: u64 = storage.get("b").unwrap().unwrap();
        assert_eq!((a, b), (1, 2));

        storage
            .batch(vec![BatchOp::Remove { key: b"a".to_vec() }])
            .unwrap();
        let removed: Option<u64> = storage.get("a").unwrap();
        assert_eq!(removed, None);
    }

    #[test]
    fn test_clones_share_database() {
        let storage = Storage::open_temporary().unwrap();
        let other = storage.clone();

        storage.put("shared", &7u64).unwrap();
        let value: Option<u64> = other.get("shared").unwrap();
        assert_eq!(value, Some(7));
    }

    #[test]
    fn test_key_construction() {
        let hash = Hash([0xBB; 32]);

        let height_key = Storage::block_height_key(42);
        assert!(height_key.starts_with(b"block:height:"));
        assert!(Storage::block_height_key(1) < Storage::block_height_key(256));

        let hash_key = Storage::block_hash_key(&hash);
        assert!(hash_key.starts_with(b"block:hash:"));
    }
}
