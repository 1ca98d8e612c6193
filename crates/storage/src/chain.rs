//! Append-only block log.

use crate::db::{Result, Storage, StorageError};
use keyto_core::{Block, Hash};

/// Keys for chain metadata.
const CHAIN_HEAD_KEY: &[u8] = b"chain:head";
const CHAIN_HEIGHT_KEY: &[u8] = b"chain:height";

/// Manages block storage and the chain head.
#[derive(Clone)]
pub struct ChainStore {
    storage: Storage,
}

impl ChainStore {
    /// Create a new ChainStore over the given storage.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    // =========================================================================
    // Block Storage
    // =========================================================================

    /// Get a block by its hash.
    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        let key = Storage::block_hash_key(hash);
        self.storage.get(key)
    }

    /// Get a block by its height.
    ///
    /// This performs two lookups:
    /// 1. height → hash (secondary index)
    /// 2. hash → block (primary storage)
    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        let height_key = Storage::block_height_key(height);
        let hash: Option<Hash> = self.storage.get(&height_key)?;

        match hash {
            Some(h) => self.get_block_by_hash(&h),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Chain Head Tracking
    // =========================================================================

    /// Get the current chain head hash.
    pub fn get_head(&self) -> Result<Option<Hash>> {
        self.storage.get(CHAIN_HEAD_KEY)
    }

    /// Get the current chain height.
    /// Returns 0 if the chain is not initialized.
    pub fn get_height(&self) -> Result<u64> {
        Ok(self.storage.get::<_, u64>(CHAIN_HEIGHT_KEY)?.unwrap_or(0))
    }

    /// Check if the chain is initialized (has a genesis block).
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.get_head()?.is_some())
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Write a block, its height index and the new head in one batch.
    fn write_block(&self, block: &Block) -> Result<()> {
        let ops = vec![
            Storage::insert_op(Storage::block_hash_key(&block.hash), block)?,
            Storage::insert_op(Storage::block_height_key(block.index()), &block.hash)?,
            Storage::insert_op(CHAIN_HEAD_KEY.to_vec(), &block.hash)?,
            Storage::insert_op(CHAIN_HEIGHT_KEY.to_vec(), &block.index())?,
        ];
        self.storage.batch(ops)
    }

    /// Initialize the log with a genesis block.
    ///
    /// This will fail if:
    /// - The block index is not 0
    /// - The log is already initialized
    pub fn init_genesis(&self, genesis: &Block) -> Result<()> {
        if !genesis.is_genesis() {
            return Err(StorageError::InvalidGenesis(
                "Genesis block must have index 0 and a zero previous hash".into(),
            ));
        }

        if self.is_initialized()? {
            return Err(StorageError::InvalidGenesis(
                "Chain already initialized".into(),
            ));
        }

        self.write_block(genesis)
    }

    /// Append a new block to the log.
    ///
    /// This validates that:
    /// - The block index is exactly current_height + 1
    /// - The block's previous hash matches the current head
    ///
    /// Work, rewards and transactions are validated by the caller.
    pub fn append_block(&self, block: &Block) -> Result<()> {
        let head = self
            .get_head()?
            .ok_or_else(|| StorageError::InvalidGenesis("Chain not initialized".into()))?;
        let height = self.get_height()?;

        if block.index() != height + 1 {
            return Err(StorageError::LinkMismatch {
                index: block.index(),
                reason: format!("expected index {}", height + 1),
            });
        }

        if block.header.previous_hash != head {
            return Err(StorageError::LinkMismatch {
                index: block.index(),
                reason: format!(
                    "previous hash {} does not match head {}",
                    block.header.previous_hash, head
                ),
            });
        }

        self.write_block(block)
    }

    /// Get blocks in a range [from_height, to_height].
    pub fn get_blocks_range(&self, from_height: u64, to_height: u64) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for height in from_height..=to_height {
            match self.get_block_by_height(height)? {
                Some(block) => blocks.push(block),
                None => {
                    return Err(StorageError::NotFound(format!("block at height {}", height)))
                }
            }
        }
        Ok(blocks)
    }

    /// Load the whole log in index order. Empty if uninitialized.
    pub fn load_all(&self) -> Result<Vec<Block>> {
        if !self.is_initialized()? {
            return Ok(Vec::new());
        }
        self.get_blocks_range(0, self.get_height()?)
    }
}
