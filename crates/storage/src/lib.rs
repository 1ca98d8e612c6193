//! Persistent storage layer for keytocoin.
//!
//! This crate provides the storage backend for the node:
//! - Block log (by hash and height) with an atomic head update
//! - Wallet checkpoints so restarts replay only recent blocks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! │              (Node, Ledger, Chain replay)                │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   Storage Layer                          │
//! │  ┌──────────────┐  ┌─────────────┐  ┌────────────────┐  │
//! │  │ SnapshotStore│  │ ChainStore  │  │ Storage (DB)   │  │
//! │  │  - Wallets   │  │  - Blocks   │  │  - sled wrapper│  │
//! │  │  - Supply    │  │  - Height   │  │  - batches     │  │
//! │  │              │  │  - Genesis  │  │  - key helpers │  │
//! │  └──────────────┘  └─────────────┘  └────────────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                    sled Database                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use keyto_storage::{ChainStore, Storage};
//! use keyto_core::Block;
//!
//! let storage = Storage::open("./keyto_data").unwrap();
//! let chain = ChainStore::new(storage.clone());
//! chain.init_genesis(&Block::genesis(0)).unwrap();
//! assert_eq!(chain.get_height().unwrap(), 0);
//! ```

pub mod chain;
pub mod db;
pub mod snapshot;

// Re-export commonly used types
pub use chain::ChainStore;
pub use db::{BatchOp, Result, Storage, StorageError};
pub use snapshot::{SnapshotStore, WalletCheckpoint};
