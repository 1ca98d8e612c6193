//! Wallet checkpoints.
//!
//! A checkpoint records every wallet and the minted supply as of a block
//! height. On startup the node loads the newest checkpoint and replays only
//! the blocks above it.

use crate::db::{Result, Storage};
use keyto_core::{Address, Hash, Wallet};
use serde::{Deserialize, Serialize};

const CHECKPOINT_KEY: &[u8] = b"wallets:checkpoint";

/// Ledger state as of the end of block `height`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCheckpoint {
    /// Last block folded into this checkpoint.
    pub height: u64,
    /// Hash of that block, used to detect a checkpoint from another chain.
    pub block_hash: Hash,
    /// Total minted supply at `height`.
    pub total_supply: u64,
    /// Every wallet the ledger has materialized.
    pub wallets: Vec<(Address, Wallet)>,
}

/// Reads and writes the wallet checkpoint.
#[derive(Clone)]
pub struct SnapshotStore {
    storage: Storage,
}

impl SnapshotStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Replace the stored checkpoint.
    pub fn put_checkpoint(&self, checkpoint: &WalletCheckpoint) -> Result<()> {
        self.storage.put(CHECKPOINT_KEY, checkpoint)?;
        self.storage.flush()
    }

    /// The newest checkpoint, if one was ever written.
    pub fn load_checkpoint(&self) -> Result<Option<WalletCheckpoint>> {
        self.storage.get(CHECKPOINT_KEY)
    }
}
