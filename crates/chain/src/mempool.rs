//! Transaction mempool for pending transfers.
//!
//! The mempool is a FIFO of admitted transactions waiting to be mined. At
//! most one transaction holds a (sender, nonce) slot, whether it is queued
//! or drained into a block that is still being mined.

use crate::ledger::{Ledger, LedgerError};
use keyto_consensus::{TransactionValidator, ValidationError};
use keyto_core::{Address, Block, Hash, Transaction};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Errors that can occur during mempool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("a transaction from {from} with nonce {nonce} is already queued")]
    DuplicateNonce { from: Address, nonce: u64 },

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// Transaction mempool.
pub struct Mempool {
    config: MempoolConfig,
    /// Admitted transactions, oldest first.
    queue: VecDeque<Transaction>,
    /// (sender, nonce) slots currently queued.
    slots: HashSet<(Address, u64)>,
    /// Slots drained by a miner and not yet mined, requeued or released.
    in_flight: HashSet<(Address, u64)>,
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            slots: HashSet::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if a transaction is in the mempool.
    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.queue.iter().any(|tx| tx.hash() == *tx_hash)
    }

    /// Check if the (sender, nonce) slot is queued or held by a miner.
    pub fn has_slot(&self, from: &Address, nonce: u64) -> bool {
        let slot = (*from, nonce);
        self.slots.contains(&slot) || self.in_flight.contains(&slot)
    }


    /// Validate a transaction and append it to the queue.
    ///
    /// Checks run in order: amount, signature and key binding, duplicate
    /// slot, the sender's ledger nonce and balance, then capacity.
    pub fn admit(&mut self, tx: Transaction, ledger: &Ledger) -> Result<Hash> {
        TransactionValidator::validate_transaction(&tx)?;

        if self.has_slot(&tx.from, tx.nonce) {
            return Err(MempoolError::DuplicateNonce {
                from: tx.from,
                nonce: tx.nonce,
            });
        }

        ledger.check_transfer(&tx)?;

        if self.queue.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }

        let hash = tx.hash();
        self.slots.insert(tx.slot());
        self.queue.push_back(tx);
        Ok(hash)
    }

    /// Remove up to `limit` transactions from the head.
    ///
    /// Their slots stay reserved until the caller hands each transaction
    /// back through [`Mempool::requeue_front`] or [`Mempool::release`], or
    /// a block consuming it reaches [`Mempool::remove_included`].
    pub fn drain(&mut self, limit: usize) -> Vec<Transaction> {
        let count = limit.min(self.queue.len());
        let drained: Vec<_> = self.queue.drain(..count).collect();
        for tx in &drained {
            let slot = tx.slot();
            self.slots.remove(&slot);
            self.in_flight.insert(slot);
        }
        drained
    }

    /// Put drained transactions back at the head in their original order.
    pub fn requeue_front(&mut self, txs: Vec<Transaction>) {
        for tx in txs.into_iter().rev() {
            let slot = tx.slot();
            self.in_flight.remove(&slot);
            if self.slots.insert(slot) {
                self.queue.push_front(tx);
            }
        }
    }

    /// Give up the reservation of drained transactions that will not return.
    pub fn release(&mut self, txs: &[Transaction]) {
        for tx in txs {
            self.in_flight.remove(&tx.slot());
        }
    }

    /// Drop every entry whose slot was consumed by `block`.
    pub fn remove_included(&mut self, block: &Block) -> usize {
        let consumed: HashSet<_> = block.transactions.iter().map(Transaction::slot).collect();
        let before = self.queue.len();
        self.queue.retain(|tx| !consumed.contains(&tx.slot()));
        for slot in &consumed {
            self.slots.remove(slot);
            self.in_flight.remove(slot);
        }
        before - self.queue.len()
    }

    /// Drop entries the ledger can never accept again.
    pub fn evict_stale(&mut self, ledger: &Ledger) -> Vec<Transaction> {
        let (stale, keep): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|tx| matches!(ledger.check_transfer(tx), Err(e) if e.is_permanent()));
        self.queue = keep.into();
        for tx in &stale {
            self.slots.remove(&tx.slot());
        }
        stale
    }

    /// Copy of up to `limit` transactions from the head.
    pub fn peek(&self, limit: usize) -> Vec<Transaction> {
        self.queue.iter().take(limit).cloned().collect()
    }

    /// Get all transactions in the mempool, oldest first.
    pub fn get_all(&self) -> Vec<Transaction> {
        self.queue.iter().cloned().collect()
    }

    /// Get mempool statistics.
    pub fn stats(&self) -> MempoolStats {
        let senders: HashSet<_> = self.queue.iter().map(|tx| tx.from).collect();
        MempoolStats {
            total_transactions: self.len(),
            unique_senders: senders.len(),
            in_flight: self.in_flight.len(),
            capacity: self.config.max_transactions,
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

/// Mempool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolStats {
    /// Total number of transactions.
    pub total_transactions: usize,
    /// Number of unique senders.
    pub unique_senders: usize,
    /// Drained transactions a miner still holds.
    pub in_flight: usize,
    /// Mempool capacity.
    pub capacity: usize,
}
