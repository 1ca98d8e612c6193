//! Fan-out of chain events to connected peers.
//!
//! Every peer gets its own bounded queue. Publishing never waits: a peer
//! whose queue is full is disconnected and has to resubscribe, which gets
//! it a fresh `sync` event.

use keyto_core::{Address, Block, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Summary of an appended block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub index: u64,
    pub hash: Hash,
    pub previous_hash: Hash,
    pub miner: Address,
    pub reward: u64,
    pub tx_count: usize,
    /// Total supply after this block.
    pub supply: u64,
    pub difficulty: u32,
}

impl BlockSummary {
    pub fn new(block: &Block, supply: u64) -> Self {
        Self {
            index: block.index(),
            hash: block.hash,
            previous_hash: block.header.previous_hash,
            miner: block.header.miner,
            reward: block.header.reward,
            tx_count: block.tx_count(),
            supply,
            difficulty: block.header.difficulty,
        }
    }
}

/// Summary of an admitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxSummary {
    pub hash: Hash,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub nonce: u64,
}

impl From<&Transaction> for TxSummary {
    fn from(tx: &Transaction) -> Self {
        Self {
            hash: tx.hash(),
            from: tx.from,
            to: tx.to,
            amount: tx.amount,
            nonce: tx.nonce,
        }
    }
}

/// A message pushed to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Block(BlockSummary),
    Tx(TxSummary),
    Sync { supply: u64, height: u64 },
}

/// A peer's end of the broadcast.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Event>,
}

struct Peers {
    next_id: u64,
    senders: HashMap<u64, mpsc::Sender<Event>>,
}

/// Bounded, non-blocking broadcast to every subscribed peer.
pub struct PeerBroadcaster {
    capacity: usize,
    peers: Mutex<Peers>,
}

impl PeerBroadcaster {
    /// `capacity` is the per-peer queue length (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            peers: Mutex::new(Peers {
                next_id: 0,
                senders: HashMap::new(),
            }),
        }
    }

    fn peers(&self) -> MutexGuard<'_, Peers> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a peer; `initial` is the first event it will receive.
    pub fn subscribe(&self, initial: Event) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        // Fresh channel with capacity >= 1: cannot be full or closed.
        let _ = sender.try_send(initial);

        let mut peers = self.peers();
        let id = peers.next_id;
        peers.next_id += 1;
        peers.senders.insert(id, sender);
        info!(peer = id, peers = peers.senders.len(), "Peer subscribed");

        Subscription { id, receiver }
    }

    /// Forget a peer. Its receiver ends once drained.
    pub fn unsubscribe(&self, id: u64) {
        if self.peers().senders.remove(&id).is_some() {
            info!(peer = id, "Peer unsubscribed");
        }
    }

    /// Queue `event` for every peer without waiting.
    ///
    /// Returns the number of peers the event was queued for.
    pub fn publish(&self, event: &Event) -> usize {
        let mut peers = self.peers();
        let mut delivered = 0;

        peers.senders.retain(|id, sender| match sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(peer = *id, "Peer queue full, disconnecting");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(peer = *id, "Peer gone");
                false
            }
        });

        delivered
    }

    pub fn peer_count(&self) -> usize {
        self.peers().senders.len()
    }
}
