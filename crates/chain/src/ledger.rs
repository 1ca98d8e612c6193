//! Wallet balances, nonces and minted supply.
//!
//! The ledger is the only place balances change. Every transfer is checked
//! in full before any wallet is touched, and whole blocks are applied on a
//! staged copy that replaces the live one only when every step succeeded.

use keyto_core::{Address, Block, Transaction, Wallet};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while applying transfers or rewards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transfer amount must be positive")]
    InvalidAmount,

    #[error("stale nonce (expected {expected}, got {got})")]
    StaleNonce { expected: u64, got: u64 },

    #[error("insufficient balance (required {required}, available {available})")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("reward {reward} would push supply {supply} past the cap {max_supply}")]
    SupplyExceeded {
        supply: u64,
        reward: u64,
        max_supply: u64,
    },
}

impl LedgerError {
    /// Whether the transaction can never apply again (its nonce was used).
    pub fn is_permanent(&self) -> bool {
        matches!(self, LedgerError::StaleNonce { expected, got } if got < expected)
            || matches!(self, LedgerError::InvalidAmount)
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// In-memory wallet state plus the minted supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    wallets: HashMap<Address, Wallet>,
    total_supply: u64,
    max_supply: u64,
}

impl Ledger {
    /// Empty ledger with the given supply cap.
    pub fn new(max_supply: u64) -> Self {
        Self {
            wallets: HashMap::new(),
            total_supply: 0,
            max_supply,
        }
    }

    /// Rebuild a ledger from a checkpoint.
    pub fn from_snapshot(
        max_supply: u64,
        total_supply: u64,
        wallets: impl IntoIterator<Item = (Address, Wallet)>,
    ) -> Self {
        Self {
            wallets: wallets.into_iter().collect(),
            total_supply,
            max_supply,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Wallet of `address`; zeroed if never referenced.
    pub fn wallet(&self, address: &Address) -> Wallet {
        self.wallets.get(address).copied().unwrap_or_default()
    }

    pub fn balance_of(&self, address: &Address) -> u64 {
        self.wallet(address).balance
    }

    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.wallet(address).nonce
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn max_supply(&self) -> u64 {
        self.max_supply
    }

    /// Every materialized wallet, in no particular order.
    pub fn wallets(&self) -> impl Iterator<Item = (&Address, &Wallet)> {
        self.wallets.iter()
    }

    /// Number of materialized wallets.
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Sum of all balances. Equals `total_supply` whenever the ledger is consistent.
    pub fn circulating(&self) -> u64 {
        self.wallets
            .values()
            .fold(0u64, |acc, w| acc.saturating_add(w.balance))
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Run every transfer check without mutating anything.
    pub fn check_transfer(&self, tx: &Transaction) -> Result<()> {
        if tx.amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let sender = self.wallet(&tx.from);
        if tx.nonce != sender.nonce {
            return Err(LedgerError::StaleNonce {
                expected: sender.nonce,
                got: tx.nonce,
            });
        }

        if !sender.has_balance(tx.amount) {
            return Err(LedgerError::InsufficientBalance {
                required: tx.amount,
                available: sender.balance,
            });
        }

        Ok(())
    }

    /// Debit the sender, credit the recipient and advance the sender's nonce.
    ///
    /// A transfer to oneself only advances the nonce.
    pub fn apply_transfer(&mut self, tx: &Transaction) -> Result<()> {
        self.check_transfer(tx)?;

        let sender = self.wallets.entry(tx.from).or_default();
        sender.increment_nonce();
        if tx.from == tx.to {
            return Ok(());
        }
        sender.balance -= tx.amount;

        self.wallets.entry(tx.to).or_default().credit(tx.amount);
        Ok(())
    }

    // =========================================================================
    // Rewards
    // =========================================================================

    /// Credit a block reward to `miner` and count the mined block.
    pub fn apply_reward(&mut self, miner: &Address, amount: u64) -> Result<()> {
        let next_supply = self
            .total_supply
            .checked_add(amount)
            .filter(|s| *s <= self.max_supply)
            .ok_or(LedgerError::SupplyExceeded {
                supply: self.total_supply,
                reward: amount,
                max_supply: self.max_supply,
            })?;

        let wallet = self.wallets.entry(*miner).or_default();
        wallet.credit(amount);
        wallet.mined_blocks = wallet.mined_blocks.saturating_add(1);
        self.total_supply = next_supply;
        Ok(())
    }

    /// Copy of the ledger with `amount` paid to `miner`.
    pub fn with_reward(&self, miner: &Address, amount: u64) -> Result<Ledger> {
        let mut staged = self.clone();
        staged.apply_reward(miner, amount)?;
        Ok(staged)
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// The ledger that results from applying `block`, leaving `self` untouched.
    ///
    /// The reward is credited before the transfers so a miner may spend it
    /// within the same block. Genesis applies nothing.
    pub fn applied(&self, block: &Block) -> Result<Ledger> {
        if block.is_genesis() {
            return Ok(self.clone());
        }

        let mut staged = self.with_reward(&block.header.miner, block.header.reward)?;
        for tx in &block.transactions {
            staged.apply_transfer(tx)?;
        }
        Ok(staged)
    }

    /// Apply a whole block atomically: on error nothing changes.
    pub fn apply_block(&mut self, block: &Block) -> Result<()> {
        *self = self.applied(block)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyto_core::{Hash, Keypair};

    fn funded(max_supply: u64, addr: Address, amount: u64) -> Ledger {
        let mut ledger = Ledger::new(max_supply);
        ledger.apply_reward(&addr, amount).unwrap();
        ledger
    }

    #[test]
    fn test_unknown_address_is_zeroed() {
        let ledger = Ledger::new(100);
        let addr = Address([1u8; 20]);
        assert_eq!(ledger.wallet(&addr), Wallet::default());
        assert_eq!(ledger.wallet_count(), 0);
    }

    #[test]
    fn test_reward_and_transfer() {
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);
        let mut ledger = funded(1_000, alice.address(), 50);

        let tx = Transaction::transfer(alice.address(), bob, 25, 0).signed(&alice);
        ledger.apply_transfer(&tx).unwrap();

        assert_eq!(ledger.balance_of(&alice.address()), 25);
        assert_eq!(ledger.balance_of(&bob), 25);
        assert_eq!(ledger.nonce_of(&alice.address()), 1);
        assert_eq!(ledger.wallet(&alice.address()).mined_blocks, 1);
        assert_eq!(ledger.circulating(), ledger.total_supply());
    }

    #[test]
    fn test_failed_transfer_does_not_mutate() {
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);
        let mut ledger = funded(1_000, alice.address(), 10);
        let before = ledger.clone();

        let too_much = Transaction::transfer(alice.address(), bob, 11, 0).signed(&alice);
        assert_eq!(
            ledger.apply_transfer(&too_much),
            Err(LedgerError::InsufficientBalance {
                required: 11,
                available: 10
            })
        );

        let wrong_nonce = Transaction::transfer(alice.address(), bob, 1, 3).signed(&alice);
        assert_eq!(
            ledger.apply_transfer(&wrong_nonce),
            Err(LedgerError::StaleNonce { expected: 0, got: 3 })
        );

        let zero = Transaction::transfer(alice.address(), bob, 0, 0);
        assert_eq!(ledger.apply_transfer(&zero), Err(LedgerError::InvalidAmount));

        assert_eq!(ledger, before);
    }

    #[test]
    fn test_replay_rejected() {
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);
        let mut ledger = funded(1_000, alice.address(), 10);

        let tx = Transaction::transfer(alice.address(), bob, 1, 0).signed(&alice);
        ledger.apply_transfer(&tx).unwrap();
        let err = ledger.apply_transfer(&tx).unwrap_err();
        assert_eq!(err, LedgerError::StaleNonce { expected: 1, got: 0 });
        assert!(err.is_permanent());
        assert_eq!(ledger.nonce_of(&alice.address()), 1);
    }

    #[test]
    fn test_future_nonce_is_not_permanent() {
        let err = LedgerError::StaleNonce {
            expected: 1,
            got: 2,
        };
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_self_transfer_only_advances_nonce() {
        let alice = Keypair::generate();
        let mut ledger = funded(1_000, alice.address(), 10);

        let tx = Transaction::transfer(alice.address(), alice.address(), 7, 0).signed(&alice);
        ledger.apply_transfer(&tx).unwrap();

        assert_eq!(ledger.balance_of(&alice.address()), 10);
        assert_eq!(ledger.nonce_of(&alice.address()), 1);
    }

    #[test]
    fn test_reward_respects_cap() {
        let miner = Address([3u8; 20]);
        let mut ledger = funded(100, miner, 90);

        assert!(matches!(
            ledger.apply_reward(&miner, 11),
            Err(LedgerError::SupplyExceeded { supply: 90, .. })
        ));
        assert_eq!(ledger.total_supply(), 90);

        ledger.apply_reward(&miner, 10).unwrap();
        assert_eq!(ledger.total_supply(), 100);
        assert_eq!(ledger.wallet(&miner).mined_blocks, 2);
    }

    #[test]
    fn test_with_reward_leaves_original() {
        let miner = Address([3u8; 20]);
        let ledger = funded(100, miner, 90);

        let paid = ledger.with_reward(&miner, 10).unwrap();
        assert_eq!(paid.balance_of(&miner), 100);
        assert_eq!(ledger.balance_of(&miner), 90);

        assert!(matches!(
            ledger.with_reward(&miner, 11),
            Err(LedgerError::SupplyExceeded { .. })
        ));
    }

    #[test]
    fn test_block_is_all_or_nothing() {
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);
        let mut ledger = funded(1_000, alice.address(), 10);
        let before = ledger.clone();

        let ok = Transaction::transfer(alice.address(), bob, 5, 0).signed(&alice);
        let bad = Transaction::transfer(alice.address(), bob, 500, 1).signed(&alice);
        let block = Block::candidate(1, Hash::ZERO, vec![ok, bad], alice.address(), 1, 0);

        assert!(ledger.apply_block(&block).is_err());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_reward_spendable_in_same_block() {
        let alice = Keypair::generate();
        let bob = Address([2u8; 20]);
        let mut ledger = Ledger::new(1_000);

        let tx = Transaction::transfer(alice.address(), bob, 4, 0).signed(&alice);
        let block = Block::candidate(1, Hash::ZERO, vec![tx], alice.address(), 10, 0);
        ledger.apply_block(&block).unwrap();

        assert_eq!(ledger.balance_of(&alice.address()), 6);
        assert_eq!(ledger.balance_of(&bob), 4);
        assert_eq!(ledger.total_supply(), 10);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let miner = Address([3u8; 20]);
        let ledger = funded(100, miner, 40);
        let wallets: Vec<_> = ledger.wallets().map(|(a, w)| (*a, *w)).collect();

        let restored = Ledger::from_snapshot(100, ledger.total_supply(), wallets);
        assert_eq!(restored, ledger);
    }
}
