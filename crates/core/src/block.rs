//! Block and block header structures.

use crate::crypto::Address;
use crate::hash::{CanonicalWriter, Hash};
use crate::merkle::transactions_root;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Domain tag for block header hashing.
const BLOCK_HASH_DOMAIN: &[u8] = b"keytocoin/block/v1";

/// The header of a block: everything the proof-of-work commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Block height (0 for genesis).
    pub index: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Hash of the previous block.
    pub previous_hash: Hash,
    /// Merkle root of the block's transaction hashes.
    pub tx_root: Hash,
    /// Address credited with the block reward.
    pub miner: Address,
    /// Newly minted amount credited to `miner`.
    pub reward: u64,
    /// Required number of leading zero bits in the block hash.
    pub difficulty: u32,
    /// Proof-of-work search variable.
    pub nonce: u64,
}

impl BlockHeader {
    /// Calculate the hash of this block header over its canonical encoding.
    pub fn hash(&self) -> Hash {
        let mut w = CanonicalWriter::with_domain(BLOCK_HASH_DOMAIN);
        w.put_u64(self.index)
            .put_u64(self.timestamp)
            .put_fixed(self.previous_hash.as_bytes())
            .put_fixed(self.tx_root.as_bytes())
            .put_fixed(self.miner.as_bytes())
            .put_u64(self.reward)
            .put_u32(self.difficulty)
            .put_u64(self.nonce);
        w.digest()
    }

    /// Get the current Unix timestamp.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// A block: header, transactions, and the recorded header hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transfers included in this block, in application order.
    pub transactions: Vec<Transaction>,
    /// Recorded hash of `header`.
    pub hash: Hash,
}

impl Block {
    /// Create an unsolved candidate block (nonce 0) stamped with the current time.
    pub fn candidate(
        index: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        miner: Address,
        reward: u64,
        difficulty: u32,
    ) -> Self {
        let header = BlockHeader {
            index,
            timestamp: BlockHeader::current_timestamp(),
            previous_hash,
            tx_root: transactions_root(&transactions),
            miner,
            reward,
            difficulty,
            nonce: 0,
        };
        let hash = header.hash();
        Self {
            header,
            transactions,
            hash,
        }
    }

    /// Create the genesis block.
    ///
    /// The timestamp is a parameter so every node configured alike derives
    /// the same genesis hash.
    pub fn genesis(timestamp: u64) -> Self {
        let header = BlockHeader {
            index: 0,
            timestamp,
            previous_hash: Hash::ZERO,
            tx_root: Hash::ZERO,
            miner: Address::ZERO,
            reward: 0,
            difficulty: 0,
            nonce: 0,
        };
        let hash = header.hash();
        Self {
            header,
            transactions: Vec::new(),
            hash,
        }
    }

    /// Recompute the header hash (ignoring the recorded one).
    pub fn compute_hash(&self) -> Hash {
        self.header.hash()
    }

    /// Record the current header hash.
    pub fn seal(&mut self) {
        self.hash = self.header.hash();
    }

    /// Whether the recorded hash matches the header.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Whether the header's tx root matches the transactions.
    pub fn verify_tx_root(&self) -> bool {
        transactions_root(&self.transactions) == self.header.tx_root
    }

    /// Get the block index.
    pub fn index(&self) -> u64 {
        self.header.index
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.index == 0 && self.header.previous_hash == Hash::ZERO
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
