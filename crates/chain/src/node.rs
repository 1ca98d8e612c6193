//! The node service: one owned ledger, chain and mempool.
//!
//! Lock order is always `state` then `mempool`. Proof-of-work search runs
//! with no lock held; the write lock is taken only to re-check the tip and
//! append.

use crate::blockchain::{Blockchain, BlockchainError, ChainParams, ErrorKind, Result};
use crate::events::{Event, PeerBroadcaster, Subscription, TxSummary};
use crate::ledger::Ledger;
use crate::mempool::{Mempool, MempoolConfig};
use crate::miner::{
    build_candidate, schedule_for, select_transactions, BlockTemplate, MinedBlock, MiningState,
};
use keyto_consensus::{solve, BlockValidator, CancelToken};
use keyto_core::{Address, Block, BlockHeader, Hash, Transaction};
use keyto_storage::{ChainStore, SnapshotStore, Storage, StorageError, WalletCheckpoint};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub params: ChainParams,
    pub mempool: MempoolConfig,
    /// Events buffered per peer before it is disconnected.
    pub peer_queue_capacity: usize,
    /// Write a wallet checkpoint every this many blocks (0 disables).
    pub checkpoint_interval: u64,
    /// Searches started for one mining request before giving up.
    pub max_commit_attempts: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            params: ChainParams::default(),
            mempool: MempoolConfig::default(),
            peer_queue_capacity: 64,
            checkpoint_interval: 100,
            max_commit_attempts: 3,
        }
    }
}

/// A wallet plus the current supply, read under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub balance: u64,
    pub mined_blocks: u64,
    pub nonce: u64,
    pub supply: u64,
}

/// Node health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub height: u64,
    pub supply: u64,
    pub peers: usize,
    pub pending: usize,
    /// Transactions drained into a block that is still being mined.
    pub in_flight: usize,
    pub halted: bool,
}

struct ChainState {
    ledger: Ledger,
    chain: Blockchain,
}

/// Single-writer ledger engine.
pub struct Node {
    config: NodeConfig,
    state: RwLock<ChainState>,
    mempool: Mutex<Mempool>,
    broadcaster: PeerBroadcaster,
    storage: Storage,
    blocks: ChainStore,
    snapshots: SnapshotStore,
    halted: AtomicBool,
}

impl Node {
    /// Open a node over `storage`, creating genesis on first start.
    ///
    /// Stored blocks are fully re-verified (links, proof of work, schedule,
    /// structure, every signature, then every ledger rule on replay); any
    /// failure is returned as an error and the node does not start.
    pub fn open(storage: Storage, config: NodeConfig) -> Result<Self> {
        let blocks = ChainStore::new(storage.clone());
        let snapshots = SnapshotStore::new(storage.clone());
        let params = &config.params;

        let stored = blocks.load_all()?;
        let chain = if stored.is_empty() {
            let genesis = params.genesis();
            blocks.init_genesis(&genesis)?;
            info!(hash = %genesis.hash, "Initialized genesis block");
            Blockchain::new(genesis)
        } else {
            Blockchain::from_blocks(stored, params)?
        };

        let ledger = rebuild_ledger(&chain, &snapshots, params)?;
        info!(
            height = chain.height(),
            supply = ledger.total_supply(),
            wallets = ledger.wallet_count(),
            "Node ready"
        );

        Ok(Self {
            mempool: Mutex::new(Mempool::with_config(config.mempool.clone())),
            broadcaster: PeerBroadcaster::new(config.peer_queue_capacity),
            state: RwLock::new(ChainState { ledger, chain }),
            storage,
            blocks,
            snapshots,
            halted: AtomicBool::new(false),
            config,
        })
    }

    /// A node backed by a temporary database.
    pub fn in_memory(config: NodeConfig) -> Result<Self> {
        Self::open(Storage::open_temporary()?, config)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    // =========================================================================
    // Locking
    // =========================================================================

    fn read_state(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mempool(&self) -> MutexGuard<'_, Mempool> {
        self.mempool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_halted() {
            return Err(BlockchainError::Halted);
        }
        Ok(())
    }

    fn halt(&self, err: &BlockchainError) {
        error!(error = %err, "Chain integrity failure, refusing further writes");
        self.halted.store(true, Ordering::SeqCst);
    }

    /// Whether an integrity failure stopped all writes.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn wallet(&self, address: &Address) -> WalletView {
        let state = self.read_state();
        let wallet = state.ledger.wallet(address);
        WalletView {
            balance: wallet.balance,
            mined_blocks: wallet.mined_blocks,
            nonce: wallet.nonce,
            supply: state.ledger.total_supply(),
        }
    }

    pub fn total_supply(&self) -> u64 {
        self.read_state().ledger.total_supply()
    }

    pub fn height(&self) -> u64 {
        self.read_state().chain.height()
    }

    pub fn tip(&self) -> Block {
        self.read_state().chain.tip().clone()
    }

    /// Every block from genesis to tip.
    pub fn chain(&self) -> Vec<Block> {
        self.read_state().chain.blocks().to_vec()
    }

    /// A copy of the current ledger.
    pub fn ledger(&self) -> Ledger {
        self.read_state().ledger.clone()
    }

    /// Queued transactions, oldest first.
    pub fn pending(&self) -> Vec<Transaction> {
        self.lock_mempool().get_all()
    }

    pub fn stats(&self) -> NodeStats {
        let state = self.read_state();
        let mempool = self.lock_mempool().stats();
        NodeStats {
            height: state.chain.height(),
            supply: state.ledger.total_supply(),
            peers: self.broadcaster.peer_count(),
            pending: mempool.total_transactions,
            in_flight: mempool.in_flight,
            halted: self.is_halted(),
        }
    }

    /// Re-verify the whole in-memory chain.
    pub fn verify_chain(&self) -> Result<()> {
        self.read_state().chain.verify_integrity(&self.config.params)
    }

    // =========================================================================
    // Peers
    // =========================================================================

    /// Subscribe a peer. The first event is always `sync`.
    pub fn subscribe(&self) -> Subscription {
        // Held across subscribe so no append slips between sync and registration.
        let state = self.read_state();
        self.broadcaster.subscribe(Event::Sync {
            supply: state.ledger.total_supply(),
            height: state.chain.height(),
        })
    }

    pub fn unsubscribe(&self, id: u64) {
        self.broadcaster.unsubscribe(id);
    }

    pub fn peer_count(&self) -> usize {
        self.broadcaster.peer_count()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Validate a transfer and queue it for mining.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash> {
        self.ensure_writable()?;
        let summary = TxSummary::from(&tx);

        let hash = {
            let state = self.read_state();
            let mut mempool = self.lock_mempool();
            mempool.admit(tx, &state.ledger)?
        };

        info!(
            hash = %hash,
            from = %summary.from,
            to = %summary.to,
            amount = summary.amount,
            nonce = summary.nonce,
            "Transaction admitted"
        );
        self.broadcaster.publish(&Event::Tx(summary));
        Ok(hash)
    }

    // =========================================================================
    // Mining
    // =========================================================================

    /// Mine one block crediting `miner`.
    ///
    /// Fails with `SupplyExceeded` before searching once the cap is reached
    /// and with `MiningAborted` if `cancel` fires or every commit attempt
    /// finds the tip moved. Drained transactions are returned to the head
    /// of the mempool on every failure path.
    pub fn mine(&self, miner: Address, cancel: &CancelToken) -> Result<MinedBlock> {
        self.ensure_writable()?;
        let params = &self.config.params;
        let attempts = self.config.max_commit_attempts.max(1);

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                debug!(state = %MiningState::Aborted, "Mining cancelled");
                return Err(BlockchainError::MiningAborted);
            }

            let (parent, ledger) = {
                let state = self.read_state();
                (state.chain.tip().clone(), state.ledger.clone())
            };
            let (reward, difficulty) = schedule_for(params, ledger.total_supply())?;
            let rewarded = ledger.with_reward(&miner, reward)?;

            let drained = self.lock_mempool().drain(params.max_block_txs);
            let selection = select_transactions(rewarded, drained);
            self.return_unmined(selection.deferred, &selection.evicted);

            let txs = selection.included;
            let candidate = build_candidate(&parent, miner, reward, difficulty, txs.clone());
            debug!(
                state = %MiningState::Searching { attempt },
                index = candidate.index(),
                difficulty,
                txs = txs.len(),
                "Searching for proof of work"
            );

            let Some(solution) = solve(candidate, cancel) else {
                debug!(state = %MiningState::Aborted, "Search cancelled");
                self.lock_mempool().requeue_front(txs);
                return Err(BlockchainError::MiningAborted);
            };
            debug!(
                state = %MiningState::Found,
                hash = %solution.block.hash,
                tries = solution.tries,
                "Proof of work found"
            );

            match self.commit_mined(&solution.block, solution.tries) {
                Ok(Some(mined)) => return Ok(mined),
                Ok(None) => {
                    debug!(attempt, "Tip moved during search, retrying");
                    self.lock_mempool().requeue_front(txs);
                }
                Err(BlockchainError::Ledger(e)) => {
                    debug!(attempt, error = %e, "Mined block no longer applies, retrying");
                    self.lock_mempool().requeue_front(txs);
                }
                Err(e) => {
                    self.lock_mempool().requeue_front(txs);
                    return Err(e);
                }
            }
        }

        warn!(attempts, "Mining gave up after repeated stale tips");
        Err(BlockchainError::MiningAborted)
    }

    fn return_unmined(&self, deferred: Vec<Transaction>, evicted: &[Transaction]) {
        for tx in evicted {
            info!(hash = %tx.hash(), from = %tx.from, nonce = tx.nonce, "Evicted stale transaction");
        }
        let mut mempool = self.lock_mempool();
        mempool.release(evicted);
        if !deferred.is_empty() {
            mempool.requeue_front(deferred);
        }
    }

    /// Append a block found by the local search; `None` if the tip moved.
    fn commit_mined(&self, block: &Block, tries: u64) -> Result<Option<MinedBlock>> {
        let mined = {
            let mut state = self.write_state();
            self.ensure_writable()?;
            if state.chain.tip().hash != block.header.previous_hash {
                return Ok(None);
            }
            MinedBlock {
                tries: Some(tries),
                ..self.append_locked(&mut state, block)?
            }
        };
        self.announce(&mined);
        Ok(Some(mined))
    }

    /// Unsolved block for an external miner, built from the mempool head.
    pub fn block_template(&self, miner: Address) -> Result<BlockTemplate> {
        self.ensure_writable()?;
        let params = &self.config.params;

        let state = self.read_state();
        let (reward, difficulty) = schedule_for(params, state.ledger.total_supply())?;
        let rewarded = state.ledger.with_reward(&miner, reward)?;
        let pending = self.lock_mempool().peek(params.max_block_txs);
        let selection = select_transactions(rewarded, pending);
        let block = build_candidate(state.chain.tip(), miner, reward, difficulty, selection.included);

        Ok(BlockTemplate { block, difficulty })
    }

    /// Verify and append a block solved elsewhere.
    ///
    /// Nothing the submitter claims is trusted: the hash is recomputed and
    /// checked against the difficulty the schedule requires now, and the
    /// reward, transactions and signatures are checked against live state.
    pub fn submit_block(&self, block: Block) -> Result<MinedBlock> {
        self.ensure_writable()?;
        let params = &self.config.params;

        let mined = {
            let mut state = self.write_state();
            self.ensure_writable()?;

            let tip = state.chain.tip();
            if block.header.previous_hash != tip.hash || block.index() != tip.index() + 1 {
                return Err(BlockchainError::StaleBlock {
                    tip: tip.hash,
                    height: tip.index(),
                });
            }

            BlockValidator::validate_full(
                &block,
                tip,
                state.ledger.total_supply(),
                &params.pow,
                params.max_block_txs,
                BlockHeader::current_timestamp(),
            )?;

            self.append_locked(&mut state, &block)?
        };

        self.announce(&mined);
        Ok(mined)
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Persist and apply a block that extends the tip. Caller holds the write lock.
    fn append_locked(&self, state: &mut ChainState, block: &Block) -> Result<MinedBlock> {
        let ledger = state.ledger.applied(block)?;

        if let Err(e) = self.blocks.append_block(block) {
            return Err(self.storage_failure(e));
        }
        if let Err(e) = state.chain.append(block.clone()) {
            self.halt(&e);
            return Err(e);
        }
        state.ledger = ledger;

        {
            let mut mempool = self.lock_mempool();
            mempool.remove_included(block);
            for tx in mempool.evict_stale(&state.ledger) {
                info!(hash = %tx.hash(), from = %tx.from, nonce = tx.nonce, "Evicted stale transaction");
            }
        }

        self.maybe_checkpoint(state);

        Ok(MinedBlock {
            block: block.clone(),
            supply: state.ledger.total_supply(),
            tries: None,
        })
    }

    fn storage_failure(&self, err: StorageError) -> BlockchainError {
        let err = BlockchainError::from(err);
        if err.kind() == ErrorKind::ChainLinkMismatch {
            self.halt(&err);
        }
        err
    }

    fn maybe_checkpoint(&self, state: &ChainState) {
        let interval = self.config.checkpoint_interval;
        let height = state.chain.height();
        if interval == 0 || height % interval != 0 {
            return;
        }

        let checkpoint = WalletCheckpoint {
            height,
            block_hash: state.chain.tip().hash,
            total_supply: state.ledger.total_supply(),
            wallets: state.ledger.wallets().map(|(a, w)| (*a, *w)).collect(),
        };
        match self.snapshots.put_checkpoint(&checkpoint) {
            Ok(()) => debug!(height, wallets = checkpoint.wallets.len(), "Checkpoint written"),
            Err(e) => warn!(height, error = %e, "Failed to write checkpoint"),
        }
    }

    fn announce(&self, mined: &MinedBlock) {
        let block = &mined.block;
        info!(
            state = %MiningState::Appended,
            index = block.index(),
            hash = %block.hash,
            miner = %block.header.miner,
            reward = block.header.reward,
            txs = block.tx_count(),
            supply = mined.supply,
            "Block appended"
        );
        self.broadcaster.publish(&Event::Block(mined.summary()));
    }

    /// Flush pending database writes.
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()?;
        Ok(())
    }
}

/// Load the newest usable checkpoint and replay the blocks after it.
fn rebuild_ledger(
    chain: &Blockchain,
    snapshots: &SnapshotStore,
    params: &ChainParams,
) -> Result<Ledger> {
    let max_supply = params.pow.max_supply;

    let (mut ledger, start) = match snapshots.load_checkpoint()? {
        Some(cp) if chain.get(cp.height).map(|b| b.hash) == Some(cp.block_hash) => {
            debug!(height = cp.height, "Loaded wallet checkpoint");
            let start = cp.height + 1;
            (Ledger::from_snapshot(max_supply, cp.total_supply, cp.wallets), start)
        }
        Some(cp) => {
            warn!(height = cp.height, "Checkpoint does not match stored chain, replaying from genesis");
            (Ledger::new(max_supply), 0)
        }
        None => (Ledger::new(max_supply), 0),
    };

    let skip = usize::try_from(start).unwrap_or(usize::MAX);
    for block in chain.blocks().iter().skip(skip) {
        ledger
            .apply_block(block)
            .map_err(|e| BlockchainError::ChainLinkMismatch {
                index: block.index(),
                reason: format!("replay failed: {}", e),
            })?;
    }
    if start <= chain.height() {
        info!(from = start, to = chain.height(), "Replayed blocks");
    }

    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyto_consensus::{search, DifficultySchedule, DifficultyTier, PowConfig};
    use keyto_core::Keypair;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const REWARD: u64 = 50;

    fn config(max_supply: u64) -> NodeConfig {
        NodeConfig {
            params: ChainParams {
                pow: PowConfig {
                    max_supply,
                    block_reward: REWARD,
                    difficulty: DifficultySchedule::fixed(4),
                    ..PowConfig::default()
                },
                max_block_txs: 10,
                genesis_timestamp: 0,
            },
            checkpoint_interval: 2,
            ..NodeConfig::default()
        }
    }

    fn node() -> Node {
        Node::in_memory(config(1_000_000)).unwrap()
    }

    fn mine(node: &Node, miner: Address) -> MinedBlock {
        node.mine(miner, &CancelToken::new()).unwrap()
    }

    fn assert_conserved(node: &Node) {
        let ledger = node.ledger();
        assert_eq!(ledger.circulating(), ledger.total_supply());
    }

    #[test]
    fn test_mine_then_send_scenario() {
        let node = node();
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);

        let mined = mine(&node, alice.address());
        assert_eq!(mined.block.index(), 1);
        let a = node.wallet(&alice.address());
        assert_eq!((a.balance, a.mined_blocks, a.supply), (REWARD, 1, REWARD));

        let tx = Transaction::transfer(alice.address(), bob, REWARD / 2, 0).signed(&alice);
        node.submit_transaction(tx.clone()).unwrap();
        mine(&node, Address([9u8; 20]));

        assert_eq!(node.wallet(&alice.address()).balance, REWARD - REWARD / 2);
        assert_eq!(node.wallet(&bob).balance, REWARD / 2);
        assert_eq!(node.wallet(&alice.address()).nonce, 1);
        assert_conserved(&node);

        let replay = Transaction::transfer(alice.address(), bob, 1, 0).signed(&alice);
        let err = node.submit_transaction(replay).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleNonce);
    }

    #[test]
    fn test_duplicate_nonce_then_resubmit_scenario() {
        let node = node();
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);
        mine(&node, alice.address());

        let tx1 = Transaction::transfer(alice.address(), bob, 5, 0).signed(&alice);
        let tx2 = Transaction::transfer(alice.address(), bob, 6, 0).signed(&alice);
        node.submit_transaction(tx1).unwrap();
        assert_eq!(
            node.submit_transaction(tx2).unwrap_err().kind(),
            ErrorKind::DuplicateNonce
        );

        mine(&node, alice.address());
        assert!(node.pending().is_empty());

        let tx2 = Transaction::transfer(alice.address(), bob, 6, 1).signed(&alice);
        node.submit_transaction(tx2).unwrap();
        assert_eq!(node.pending().len(), 1);
    }

    #[test]
    fn test_supply_cap_clips_last_reward() {
        let node = Node::in_memory(config(120)).unwrap();
        let miner = Address([1u8; 20]);

        assert_eq!(mine(&node, miner).block.header.reward, 50);
        assert_eq!(mine(&node, miner).block.header.reward, 50);
        let last = mine(&node, miner);
        assert_eq!(last.block.header.reward, 20);
        assert_eq!(last.supply, 120);

        let err = node.mine(miner, &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SupplyExceeded);
        assert_eq!(node.height(), 3);
        assert_conserved(&node);
    }

    #[test]
    fn test_cancelled_mining_requeues() {
        let node = node();
        let alice = Keypair::generate();
        mine(&node, alice.address());
        let tx = Transaction::transfer(alice.address(), Address([2u8; 20]), 1, 0).signed(&alice);
        node.submit_transaction(tx.clone()).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = node.mine(alice.address(), &cancel).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MiningAborted);
        assert_eq!(node.pending(), vec![tx]);
        assert_eq!(node.height(), 1);
    }

    #[test]
    fn test_submitted_block_is_reverified() {
        let node = node();
        let miner = Keypair::generate();

        let template = node.block_template(miner.address()).unwrap();
        assert_eq!(template.difficulty, 4);

        // A claimed hash that was never computed.
        let mut forged = template.block.clone();
        forged.hash = Hash::ZERO;
        assert_eq!(
            node.submit_block(forged).unwrap_err().kind(),
            ErrorKind::InvalidProofOfWork
        );

        // Inflated reward, properly solved.
        let mut greedy = template.block.clone();
        greedy.header.reward += 1;
        let greedy = search(greedy, &CancelToken::new()).unwrap();
        assert_eq!(
            node.submit_block(greedy).unwrap_err().kind(),
            ErrorKind::InvalidReward
        );

        let solved = search(template.block, &CancelToken::new()).unwrap();
        let mined = node.submit_block(solved.clone()).unwrap();
        assert_eq!(mined.supply, REWARD);

        // Same block again no longer extends the tip.
        assert_eq!(
            node.submit_block(solved).unwrap_err().kind(),
            ErrorKind::StaleBlock
        );
        assert_eq!(node.wallet(&miner.address()).mined_blocks, 1);
    }

    #[test]
    fn test_template_uses_mempool_without_draining() {
        let node = node();
        let alice = Keypair::generate();
        mine(&node, alice.address());
        let tx = Transaction::transfer(alice.address(), Address([2u8; 20]), 3, 0).signed(&alice);
        node.submit_transaction(tx.clone()).unwrap();

        let template = node.block_template(alice.address()).unwrap();
        assert_eq!(template.block.transactions, vec![tx]);
        assert_eq!(node.pending().len(), 1);

        let solved = search(template.block, &CancelToken::new()).unwrap();
        node.submit_block(solved).unwrap();
        assert!(node.pending().is_empty());
        assert_conserved(&node);
    }

    #[test]
    fn test_subscribers_get_sync_then_events() {
        let node = node();
        let alice = Keypair::generate();
        let mut sub = node.subscribe();

        let mined = mine(&node, alice.address());
        let tx = Transaction::transfer(alice.address(), Address([2u8; 20]), 1, 0).signed(&alice);
        node.submit_transaction(tx.clone()).unwrap();

        assert_eq!(
            sub.receiver.try_recv().unwrap(),
            Event::Sync {
                supply: 0,
                height: 0
            }
        );
        assert_eq!(
            sub.receiver.try_recv().unwrap(),
            Event::Block(mined.summary())
        );
        assert_eq!(
            sub.receiver.try_recv().unwrap(),
            Event::Tx(TxSummary::from(&tx))
        );
        assert_eq!(node.stats().peers, 1);
    }

    #[test]
    fn test_diverged_storage_halts_node() {
        let storage = Storage::open_temporary().unwrap();
        let node = Node::open(storage.clone(), config(1_000)).unwrap();
        let miner = Address([1u8; 20]);

        // Something else moves the stored head behind the node's back.
        let rogue = Block::candidate(1, node.tip().hash, vec![], miner, REWARD, 4);
        ChainStore::new(storage).append_block(&rogue).unwrap();

        let err = node.mine(miner, &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChainLinkMismatch);
        assert!(node.is_halted());
        assert_eq!(
            node.mine(miner, &CancelToken::new()).unwrap_err().kind(),
            ErrorKind::Halted
        );

        // Reads keep working.
        assert_eq!(node.height(), 0);
        assert_eq!(node.wallet(&miner).balance, 0);
    }

    #[test]
    fn test_restart_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);

        let (height, ledger) = {
            let node = Node::open(Storage::open(dir.path()).unwrap(), config(1_000_000)).unwrap();
            mine(&node, alice.address());
            mine(&node, alice.address());
            let tx = Transaction::transfer(alice.address(), bob, 7, 0).signed(&alice);
            node.submit_transaction(tx).unwrap();
            mine(&node, alice.address());
            node.flush().unwrap();
            (node.height(), node.ledger())
        };

        let node = Node::open(Storage::open(dir.path()).unwrap(), config(1_000_000)).unwrap();
        assert_eq!(node.height(), height);
        assert_eq!(node.ledger(), ledger);
        assert_eq!(node.wallet(&bob).balance, 7);
        assert!(node.verify_chain().is_ok());
    }

    #[test]
    fn test_corrupt_log_refuses_to_start() {
        let storage = Storage::open_temporary().unwrap();
        let params = config(1_000).params;
        let store = ChainStore::new(storage.clone());
        let genesis = params.genesis();
        store.init_genesis(&genesis).unwrap();

        // Linked correctly but never mined.
        let mut lazy = Block::candidate(1, genesis.hash, vec![], Address::ZERO, REWARD, 4);
        while lazy.hash.meets_difficulty(4) {
            lazy.header.nonce += 1;
            lazy.seal();
        }
        store.append_block(&lazy).unwrap();

        let err = Node::open(storage, config(1_000)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidProofOfWork);
    }

    #[test]
    fn test_forged_signature_refuses_to_start() {
        let storage = Storage::open_temporary().unwrap();
        let params = config(1_000).params;
        let store = ChainStore::new(storage.clone());
        let genesis = params.genesis();
        store.init_genesis(&genesis).unwrap();

        let victim = Keypair::generate();
        let thief = Keypair::generate();
        let funded = Block::candidate(1, genesis.hash, vec![], victim.address(), REWARD, 4);
        let funded = search(funded, &CancelToken::new()).unwrap();
        store.append_block(&funded).unwrap();

        // Claims the victim's key but carries the thief's signature.
        let mut theft =
            Transaction::transfer(victim.address(), thief.address(), REWARD, 0).signed(&thief);
        theft.public_key = victim.public_key;
        let robbed = Block::candidate(2, funded.hash, vec![theft], thief.address(), REWARD, 4);
        let robbed = search(robbed, &CancelToken::new()).unwrap();
        store.append_block(&robbed).unwrap();

        let err = Node::open(storage, config(1_000)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ChainLinkMismatch);
    }

    #[test]
    fn test_foreign_genesis_refuses_to_start() {
        let storage = Storage::open_temporary().unwrap();
        ChainStore::new(storage.clone())
            .init_genesis(&Block::genesis(12345))
            .unwrap();

        let err = Node::open(storage, config(1_000)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ChainLinkMismatch);
    }

    #[test]
    fn test_concurrent_admission_while_mining() {
        let node = Arc::new(
            Node::in_memory(NodeConfig {
                max_commit_attempts: 16,
                ..config(1_000_000)
            })
            .unwrap(),
        );
        let keypairs: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        for kp in &keypairs {
            mine(&node, kp.address());
        }

        let handles: Vec<_> = keypairs
            .into_iter()
            .map(|kp| {
                let node = Arc::clone(&node);
                thread::spawn(move || {
                    let tx = Transaction::transfer(kp.address(), Address([2u8; 20]), 10, 0)
                        .signed(&kp);
                    node.submit_transaction(tx).unwrap();
                    node.mine(kp.address(), &CancelToken::new()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(node.height(), 8);
        assert_eq!(node.wallet(&Address([2u8; 20])).balance, 40);
        assert!(node.pending().is_empty());
        assert!(node.verify_chain().is_ok());
        assert_conserved(&node);
    }

    #[test]
    fn test_duplicate_rejected_while_mining() {
        // Cheap first block, then a search that will not finish on its own.
        let mut config = config(1_000_000);
        config.params.pow.difficulty = DifficultySchedule::new(
            vec![DifficultyTier {
                below_supply: REWARD,
                bits: 4,
            }],
            40,
        );
        let node = Arc::new(Node::in_memory(config).unwrap());
        let alice = Keypair::generate();
        mine(&node, alice.address());

        let first = Transaction::transfer(alice.address(), Address([2u8; 20]), 5, 0).signed(&alice);
        node.submit_transaction(first.clone()).unwrap();

        let cancel = CancelToken::new();
        let worker = {
            let node = Arc::clone(&node);
            let cancel = cancel.clone();
            let miner = alice.address();
            thread::spawn(move || node.mine(miner, &cancel))
        };

        let mut waited = 0;
        while node.stats().in_flight == 0 {
            assert!(waited < 2_000, "search never picked up the transaction");
            thread::sleep(Duration::from_millis(5));
            waited += 1;
        }
        assert!(node.pending().is_empty());

        let rival = Transaction::transfer(alice.address(), Address([3u8; 20]), 7, 0).signed(&alice);
        assert_eq!(
            node.submit_transaction(rival).unwrap_err().kind(),
            ErrorKind::DuplicateNonce
        );

        cancel.cancel();
        let err = worker.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MiningAborted);

        assert_eq!(node.pending(), vec![first]);
        assert_eq!(node.stats().in_flight, 0);
        assert_eq!(node.height(), 1);
    }
}
