//! Proof of Work consensus for keytocoin.
//!
//! This crate provides the consensus rules the node enforces:
//! - Supply-indexed difficulty schedule and capped block rewards
//! - Nonce search with cooperative cancellation
//! - Independent re-verification of submitted work
//! - Transaction validation (amount, key binding, signature)
//! - Block validation (structure, tx root, parent links)
//!
//! # Example
//!
//! ```rust,no_run
//! use keyto_consensus::{search, verify_work, CancelToken, PowConfig};
//! use keyto_core::{Address, Block};
//!
//! let config = PowConfig::default();
//! let genesis = Block::genesis(0);
//! let miner = Address::from_bytes([1u8; 20]);
//!
//! let candidate = Block::candidate(
//!     1,
//!     genesis.hash,
//!     vec![],
//!     miner,
//!     config.reward_for(0).unwrap(),
//!     config.difficulty_for(0),
//! );
//! let block = search(candidate, &CancelToken::new()).unwrap();
//! verify_work(&block).unwrap();
//! ```

pub mod pow;
pub mod validator;

// Re-export commonly used types
pub use pow::{
    search, solve, verify_work, CancelToken, ConsensusError, DifficultySchedule, DifficultyTier,
    PowConfig, Solution,
};
pub use validator::{BlockValidator, TransactionValidator, ValidationError};
