//! Proof of Work consensus rules.
//!
//! A block is valid work when its header hash has at least `difficulty`
//! leading zero bits. Difficulty is not retargeted on timing; it escalates
//! with the total minted supply so the puzzle gets harder as the supply
//! approaches its cap.

use keyto_core::{Block, BlockHeader, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Nonces tried between cancellation checks.
pub const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Errors that can occur while checking consensus rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("recorded block hash {recorded} does not match computed {computed}")]
    HashMismatch { recorded: Hash, computed: Hash },

    #[error("block hash has {got} leading zero bits, {required} required")]
    InvalidProofOfWork { required: u32, got: u32 },

    #[error("block declares difficulty {got}, schedule requires {expected}")]
    WrongDifficulty { expected: u32, got: u32 },

    #[error("block reward {got} does not match scheduled reward {expected}")]
    InvalidReward { expected: u64, got: u64 },

    #[error("total supply {supply} has reached the cap {max_supply}")]
    SupplyExceeded { supply: u64, max_supply: u64 },

    #[error("block timestamp is earlier than parent")]
    TimestampTooEarly,

    #[error("block timestamp is too far in the future")]
    TimestampTooFuture,
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// One step of the difficulty schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyTier {
    /// The tier applies while total supply is strictly below this value.
    pub below_supply: u64,
    /// Required leading zero bits.
    pub bits: u32,
}

/// Supply-indexed difficulty schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifficultySchedule {
    /// Tiers in ascending `below_supply` order.
    tiers: Vec<DifficultyTier>,
    /// Bits required once supply is past every tier.
    ceiling_bits: u32,
}

impl DifficultySchedule {
    /// Build a schedule. Tiers are sorted by threshold.
    pub fn new(mut tiers: Vec<DifficultyTier>, ceiling_bits: u32) -> Self {
        tiers.sort_by_key(|t| t.below_supply);
        Self {
            tiers,
            ceiling_bits,
        }
    }

    /// A schedule that never escalates.
    pub fn fixed(bits: u32) -> Self {
        Self::new(Vec::new(), bits)
    }

    /// Difficulty for the next block given the supply minted so far.
    pub fn bits_for_supply(&self, supply: u64) -> u32 {
        self.tiers
            .iter()
            .find(|tier| supply < tier.below_supply)
            .map(|tier| tier.bits)
            .unwrap_or(self.ceiling_bits)
    }
}

impl Default for DifficultySchedule {
    /// 2, 3 and 4 leading hex zeros, stepping up at 5M and 10M minted.
    fn default() -> Self {
        Self::new(
            vec![
                DifficultyTier {
                    below_supply: 5_000_000,
                    bits: 8,
                },
                DifficultyTier {
                    below_supply: 10_000_000,
                    bits: 12,
                },
            ],
            16,
        )
    }
}

/// Proof of Work configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowConfig {
    /// Hard cap on the total minted supply.
    pub max_supply: u64,
    /// Nominal reward per block.
    pub block_reward: u64,
    /// Difficulty schedule.
    pub difficulty: DifficultySchedule,
    /// Maximum allowed clock drift in seconds.
    pub max_clock_drift: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            max_supply: 17_000_000,
            block_reward: 1,
            difficulty: DifficultySchedule::default(),
            max_clock_drift: 120,
        }
    }
}

impl PowConfig {
    /// Difficulty required for the next block.
    pub fn difficulty_for(&self, supply: u64) -> u32 {
        self.difficulty.bits_for_supply(supply)
    }

    /// Reward for the next block: the nominal reward, clipped to the cap.
    ///
    /// Fails once the supply is exhausted so no search is ever started for a
    /// block that could mint nothing.
    pub fn reward_for(&self, supply: u64) -> Result<u64> {
        let remaining = self.max_supply.saturating_sub(supply);
        if remaining == 0 {
            return Err(ConsensusError::SupplyExceeded {
                supply,
                max_supply: self.max_supply,
            });
        }
        Ok(self.block_reward.min(remaining))
    }

    /// Check the difficulty and reward a block declares against the schedule.
    pub fn verify_schedule(&self, block: &Block, supply_before: u64) -> Result<()> {
        let expected_difficulty = self.difficulty_for(supply_before);
        if block.header.difficulty != expected_difficulty {
            return Err(ConsensusError::WrongDifficulty {
                expected: expected_difficulty,
                got: block.header.difficulty,
            });
        }

        let expected_reward = self.reward_for(supply_before)?;
        if block.header.reward != expected_reward {
            return Err(ConsensusError::InvalidReward {
                expected: expected_reward,
                got: block.header.reward,
            });
        }

        Ok(())
    }

    /// Verify the block timestamp is valid.
    pub fn verify_timestamp(&self, block: &Block, parent_timestamp: u64, now: u64) -> Result<()> {
        if block.header.timestamp < parent_timestamp {
            return Err(ConsensusError::TimestampTooEarly);
        }
        if block.header.timestamp > now.saturating_add(self.max_clock_drift) {
            return Err(ConsensusError::TimestampTooFuture);
        }
        Ok(())
    }
}

/// Recompute the block hash and check it against the declared difficulty.
///
/// The recorded hash is never trusted: a block whose recorded hash differs
/// from its header is rejected even if both happen to meet the target.
pub fn verify_work(block: &Block) -> Result<()> {
    let computed = block.compute_hash();
    if computed != block.hash {
        return Err(ConsensusError::HashMismatch {
            recorded: block.hash,
            computed,
        });
    }

    let got = computed.leading_zero_bits();
    if got < block.header.difficulty {
        return Err(ConsensusError::InvalidProofOfWork {
            required: block.header.difficulty,
            got,
        });
    }

    Ok(())
}

/// Shared flag used to abandon a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A sealed block and the number of hashes it took to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub block: Block,
    pub tries: u64,
}

/// Vary the nonce until the header meets its difficulty.
///
/// Returns `None` if the token is cancelled first. The returned block has
/// its hash sealed.
pub fn solve(mut block: Block, cancel: &CancelToken) -> Option<Solution> {
    let mut tries: u64 = 0;
    loop {
        if tries % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return None;
        }

        let hash = block.header.hash();
        tries = tries.saturating_add(1);
        if hash.meets_difficulty(block.header.difficulty) {
            block.hash = hash;
            return Some(Solution { block, tries });
        }

        block.header.nonce = block.header.nonce.wrapping_add(1);

        // Whole nonce space tried: move the timestamp and keep going.
        if block.header.nonce == 0 {
            block.header.timestamp = BlockHeader::current_timestamp().max(block.header.timestamp + 1);
        }
    }
}

/// [`solve`] without the try count.
pub fn search(block: Block, cancel: &CancelToken) -> Option<Block> {
    solve(block, cancel).map(|solution| solution.block)
}
