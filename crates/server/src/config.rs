//! Command-line configuration.

use clap::Parser;
use keyto_chain::{ChainParams, MempoolConfig, NodeConfig};
use keyto_consensus::PowConfig;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "keytocoin")]
#[command(version, about = "A minimal proof-of-work coin node", long_about = None)]
pub struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8882)]
    pub port: u16,

    /// Database directory; runs in memory when omitted
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Hard cap on minted supply
    #[arg(long, default_value_t = 17_000_000)]
    pub max_supply: u64,

    /// Reward per mined block
    #[arg(long, default_value_t = 1)]
    pub block_reward: u64,

    /// Maximum transactions per block
    #[arg(long, default_value_t = 1000)]
    pub max_block_txs: usize,

    /// Maximum queued transactions
    #[arg(long, default_value_t = 10_000)]
    pub mempool_size: usize,

    /// Events buffered per WebSocket peer before it is dropped
    #[arg(long, default_value_t = 64)]
    pub peer_queue: usize,

    /// Blocks between wallet checkpoints (0 disables)
    #[arg(long, default_value_t = 100)]
    pub checkpoint_interval: u64,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            params: ChainParams {
                pow: PowConfig {
                    max_supply: self.max_supply,
                    block_reward: self.block_reward,
                    ..PowConfig::default()
                },
                max_block_txs: self.max_block_txs,
                ..ChainParams::default()
            },
            mempool: MempoolConfig {
                max_transactions: self.mempool_size,
            },
            peer_queue_capacity: self.peer_queue,
            checkpoint_interval: self.checkpoint_interval,
            ..NodeConfig::default()
        }
    }
}
