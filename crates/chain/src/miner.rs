//! Block assembly for the mining loop.
//!
//! A mining attempt moves through
//! `Idle -> Searching -> Found -> Appended`, or ends in `Aborted`. The node
//! drives the transitions; this module holds the pieces that need no lock:
//! picking transactions against a ledger snapshot and building the
//! candidate header.

use crate::blockchain::ChainParams;
use crate::events::BlockSummary;
use crate::ledger::Ledger;
use keyto_consensus::ConsensusError;
use keyto_core::{Address, Block, Transaction};
use serde::Serialize;
use std::fmt;

/// Where a mining attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningState {
    Idle,
    Searching { attempt: u32 },
    Found,
    Appended,
    Aborted,
}

impl fmt::Display for MiningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiningState::Idle => f.write_str("idle"),
            MiningState::Searching { attempt } => write!(f, "searching (attempt {})", attempt),
            MiningState::Found => f.write_str("found"),
            MiningState::Appended => f.write_str("appended"),
            MiningState::Aborted => f.write_str("aborted"),
        }
    }
}

/// Outcome of filtering a batch of transactions against a ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Apply cleanly in order; go into the block.
    pub included: Vec<Transaction>,
    /// Cannot apply now but may later (future nonce, low balance).
    pub deferred: Vec<Transaction>,
    /// Can never apply: their nonce is already used.
    pub evicted: Vec<Transaction>,
}

/// Apply `txs` in order to `rewarded` and sort them by outcome.
///
/// `rewarded` must already hold the block reward (see
/// [`Ledger::with_reward`]), the same order the block is applied in, so the
/// selection matches what the ledger will accept.
pub fn select_transactions(mut rewarded: Ledger, txs: Vec<Transaction>) -> Selection {
    let mut selection = Selection::default();

    for tx in txs {
        match rewarded.apply_transfer(&tx) {
            Ok(()) => selection.included.push(tx),
            Err(e) if e.is_permanent() => selection.evicted.push(tx),
            Err(_) => selection.deferred.push(tx),
        }
    }
    selection
}

/// Reward and difficulty for the block after `supply`.
///
/// Fails with `SupplyExceeded` once nothing is left to mint.
pub fn schedule_for(params: &ChainParams, supply: u64) -> Result<(u64, u32), ConsensusError> {
    let reward = params.pow.reward_for(supply)?;
    Ok((reward, params.pow.difficulty_for(supply)))
}

/// Unsolved block on top of `parent`.
pub fn build_candidate(
    parent: &Block,
    miner: Address,
    reward: u64,
    difficulty: u32,
    transactions: Vec<Transaction>,
) -> Block {
    let mut block = Block::candidate(
        parent.index() + 1,
        parent.hash,
        transactions,
        miner,
        reward,
        difficulty,
    );
    // Keep timestamps monotone even if the wall clock steps back.
    if block.header.timestamp < parent.header.timestamp {
        block.header.timestamp = parent.header.timestamp;
        block.seal();
    }
    block
}

/// A block the node appended, with the supply it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedBlock {
    pub block: Block,
    pub supply: u64,
    /// Hashes computed by the local search; `None` for submitted blocks.
    pub tries: Option<u64>,
}

impl MinedBlock {
    pub fn summary(&self) -> BlockSummary {
        BlockSummary::new(&self.block, self.supply)
    }
}

/// Unsolved work handed to an external miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTemplate {
    pub block: Block,
    pub difficulty: u32,
}
