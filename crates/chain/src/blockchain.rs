//! The append-only chain and node-level errors.

use crate::ledger::LedgerError;
use crate::mempool::MempoolError;
use keyto_consensus::{pow, BlockValidator, ConsensusError, PowConfig, ValidationError};
use keyto_core::{Block, Hash};
use keyto_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("chain link broken at block {index}: {reason}")]
    ChainLinkMismatch { index: u64, reason: String },

    #[error("block does not extend the current tip {tip} at height {height}")]
    StaleBlock { tip: Hash, height: u64 },

    #[error("mining aborted")]
    MiningAborted,

    #[error("node halted after an integrity failure")]
    Halted,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Stable names reported to clients for every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSignature,
    UnknownOrMismatchedAddress,
    StaleNonce,
    DuplicateNonce,
    InsufficientBalance,
    InvalidAmount,
    InvalidProofOfWork,
    SupplyExceeded,
    ChainLinkMismatch,
    StaleBlock,
    InvalidReward,
    InvalidBlock,
    MempoolFull,
    MiningAborted,
    Halted,
    Storage,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSignature => "InvalidSignature",
            ErrorKind::UnknownOrMismatchedAddress => "UnknownOrMismatchedAddress",
            ErrorKind::StaleNonce => "StaleNonce",
            ErrorKind::DuplicateNonce => "DuplicateNonce",
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::InvalidAmount => "InvalidAmount",
            ErrorKind::InvalidProofOfWork => "InvalidProofOfWork",
            ErrorKind::SupplyExceeded => "SupplyExceeded",
            ErrorKind::ChainLinkMismatch => "ChainLinkMismatch",
            ErrorKind::StaleBlock => "StaleBlock",
            ErrorKind::InvalidReward => "InvalidReward",
            ErrorKind::InvalidBlock => "InvalidBlock",
            ErrorKind::MempoolFull => "MempoolFull",
            ErrorKind::MiningAborted => "MiningAborted",
            ErrorKind::Halted => "Halted",
            ErrorKind::Storage => "Storage",
            ErrorKind::InvalidRequest => "InvalidRequest",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn consensus_kind(err: &ConsensusError) -> ErrorKind {
    match err {
        ConsensusError::HashMismatch { .. }
        | ConsensusError::InvalidProofOfWork { .. }
        | ConsensusError::WrongDifficulty { .. } => ErrorKind::InvalidProofOfWork,
        ConsensusError::InvalidReward { .. } => ErrorKind::InvalidReward,
        ConsensusError::SupplyExceeded { .. } => ErrorKind::SupplyExceeded,
        ConsensusError::TimestampTooEarly | ConsensusError::TimestampTooFuture => {
            ErrorKind::InvalidBlock
        }
    }
}

fn validation_kind(err: &ValidationError) -> ErrorKind {
    match err {
        ValidationError::InvalidSignature => ErrorKind::InvalidSignature,
        ValidationError::AddressMismatch => ErrorKind::UnknownOrMismatchedAddress,
        ValidationError::InvalidAmount => ErrorKind::InvalidAmount,
        ValidationError::InvalidHeight { .. } | ValidationError::InvalidPrevHash { .. } => {
            ErrorKind::StaleBlock
        }
        ValidationError::InvalidTxRoot
        | ValidationError::DuplicateTransaction
        | ValidationError::TooManyTransactions { .. }
        | ValidationError::NonEmptyGenesis => ErrorKind::InvalidBlock,
        ValidationError::Consensus(e) => consensus_kind(e),
    }
}

fn ledger_kind(err: &LedgerError) -> ErrorKind {
    match err {
        LedgerError::InvalidAmount => ErrorKind::InvalidAmount,
        LedgerError::StaleNonce { .. } => ErrorKind::StaleNonce,
        LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
        LedgerError::SupplyExceeded { .. } => ErrorKind::SupplyExceeded,
    }
}

impl BlockchainError {
    /// The client-facing kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockchainError::Storage(StorageError::LinkMismatch { .. }) => {
                ErrorKind::ChainLinkMismatch
            }
            BlockchainError::Storage(_) => ErrorKind::Storage,
            BlockchainError::Consensus(e) => consensus_kind(e),
            BlockchainError::Validation(e) => validation_kind(e),
            BlockchainError::Ledger(e) => ledger_kind(e),
            BlockchainError::Mempool(e) => match e {
                MempoolError::Invalid(v) => validation_kind(v),
                MempoolError::Ledger(l) => ledger_kind(l),
                MempoolError::DuplicateNonce { .. } => ErrorKind::DuplicateNonce,
                MempoolError::MempoolFull(_) => ErrorKind::MempoolFull,
            },
            BlockchainError::ChainLinkMismatch { .. } => ErrorKind::ChainLinkMismatch,
            BlockchainError::StaleBlock { .. } => ErrorKind::StaleBlock,
            BlockchainError::MiningAborted => ErrorKind::MiningAborted,
            BlockchainError::Halted => ErrorKind::Halted,
            BlockchainError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    fn link(index: u64, reason: impl Into<String>) -> Self {
        BlockchainError::ChainLinkMismatch {
            index,
            reason: reason.into(),
        }
    }
}

/// Chain parameters shared by every node of the same network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Supply cap, reward and difficulty schedule.
    pub pow: PowConfig,
    /// Maximum transactions per block.
    pub max_block_txs: usize,
    /// Timestamp baked into the genesis block.
    pub genesis_timestamp: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            pow: PowConfig::default(),
            max_block_txs: 1000,
            genesis_timestamp: 1_700_000_000,
        }
    }
}

impl ChainParams {
    /// The genesis block every node with these parameters agrees on.
    pub fn genesis(&self) -> Block {
        Block::genesis(self.genesis_timestamp)
    }
}

/// Ordered blocks from genesis to tip.
///
/// [`Blockchain::append`] is the only way to grow the chain; it refuses any
/// block that is not hash-linked to the current tip.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    /// A chain holding only `genesis`.
    pub fn new(genesis: Block) -> Self {
        Self {
            blocks: vec![genesis],
        }
    }

    /// Rebuild a chain from stored blocks, verifying every link and proof.
    pub fn from_blocks(blocks: Vec<Block>, params: &ChainParams) -> Result<Self> {
        let chain = Self { blocks };
        chain.verify_integrity(params)?;
        Ok(chain)
    }

    /// Latest block.
    pub fn tip(&self) -> &Block {
        // Never empty: every constructor starts from a genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Index of the tip.
    pub fn height(&self) -> u64 {
        self.tip().index()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Sum of all block rewards.
    pub fn minted(&self) -> u64 {
        self.blocks
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.header.reward))
    }

    /// Append a block that extends the tip.
    pub fn append(&mut self, block: Block) -> Result<()> {
        let tip = self.tip();
        if block.index() != tip.index() + 1 {
            return Err(BlockchainError::link(
                block.index(),
                format!("expected index {}", tip.index() + 1),
            ));
        }
        if block.header.previous_hash != tip.hash {
            return Err(BlockchainError::link(
                block.index(),
                format!("previous hash does not match tip {}", tip.hash),
            ));
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Replay every block from genesis and report the first broken one.
    ///
    /// Checks index sequence, hash links, recorded hashes, proof of work,
    /// the difficulty and reward schedule, the supply cap, block structure
    /// and every transaction signature. Balances and nonces are left to the
    /// ledger replay.
    pub fn verify_integrity(&self, params: &ChainParams) -> Result<()> {
        let genesis = self
            .blocks
            .first()
            .ok_or_else(|| BlockchainError::link(0, "missing genesis block"))?;
        if *genesis != params.genesis() {
            return Err(BlockchainError::link(0, "genesis block does not match parameters"));
        }

        let mut supply = 0u64;
        for pair in self.blocks.windows(2) {
            let (parent, block) = (&pair[0], &pair[1]);
            let index = block.index();

            if index != parent.index() + 1 {
                return Err(BlockchainError::link(
                    index,
                    format!("follows block {}", parent.index()),
                ));
            }
            if block.header.previous_hash != parent.hash {
                return Err(BlockchainError::link(index, "previous hash does not match parent"));
            }

            pow::verify_work(block)?;
            params.pow.verify_schedule(block, supply)?;
            BlockValidator::validate_block_structure(block, params.max_block_txs)
                .and_then(|()| BlockValidator::validate_block_transactions(block))
                .map_err(|e| BlockchainError::link(index, e.to_string()))?;

            supply = supply.saturating_add(block.header.reward);
        }

        Ok(())
    }
}
