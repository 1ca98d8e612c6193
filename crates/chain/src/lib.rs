//! Node orchestration for keytocoin.
//!
//! This crate brings together all components to run a single-node coin:
//! - **Ledger**: balances, nonces and minted supply
//! - **Mempool**: FIFO of admitted transfers
//! - **Blockchain**: the hash-linked block list and node-level errors
//! - **Miner**: transaction selection and candidate assembly
//! - **Events**: bounded fan-out to connected peers
//! - **Node**: the owned service tying them together over sled storage
//!
//! # Example
//!
//! ```rust,no_run
//! use keyto_chain::{Node, NodeConfig};
//! use keyto_consensus::CancelToken;
//! use keyto_core::Keypair;
//!
//! let node = Node::in_memory(NodeConfig::default()).unwrap();
//! let miner = Keypair::generate();
//!
//! let mined = node.mine(miner.address(), &CancelToken::new()).unwrap();
//! assert_eq!(mined.block.index(), 1);
//! assert_eq!(node.wallet(&miner.address()).balance, mined.block.header.reward);
//! ```

pub mod blockchain;
pub mod events;
pub mod ledger;
pub mod mempool;
pub mod miner;
pub mod node;

// Re-export commonly used types
pub use blockchain::{Blockchain, BlockchainError, ChainParams, ErrorKind};
pub use events::{BlockSummary, Event, PeerBroadcaster, Subscription, TxSummary};
pub use ledger::{Ledger, LedgerError};
pub use mempool::{Mempool, MempoolConfig, MempoolError, MempoolStats};
pub use miner::{BlockTemplate, MinedBlock, MiningState, Selection};
pub use node::{Node, NodeConfig, NodeStats, WalletView};
