//! Core primitives for keytocoin.
//!
//! This crate provides the fundamental types used throughout the node:
//! - Hashing and canonical byte encoding
//! - Ed25519 keys, addresses and the key/address verifier
//! - Transfers
//! - Blocks and block headers
//! - Merkle commitments over block transactions
//! - Wallet state

pub mod block;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod transaction;
pub mod wallet;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockHeader};
pub use crypto::{Address, CryptoError, KeyVerifier, Keypair, PublicKey, Signature};
pub use hash::{hash, hash_concat, CanonicalWriter, Hash, H256};
pub use merkle::{merkle_root, transactions_root};
pub use transaction::{Transaction, TransactionError};
pub use wallet::Wallet;
