//! Transaction and block validation rules.
//!
//! These checks need no ledger access. Nonce and balance rules, and applying
//! a block to balances, are the ledger's job.

use crate::pow::{self, ConsensusError, PowConfig};
use keyto_core::{Block, CryptoError, Hash, Transaction, TransactionError};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transaction signature verification failed")]
    InvalidSignature,

    #[error("public key does not match sender address")]
    AddressMismatch,

    #[error("transfer amount must be positive")]
    InvalidAmount,

    #[error("block index mismatch (expected {expected}, got {got})")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("block previous hash {got} does not match parent {expected}")]
    InvalidPrevHash { expected: Hash, got: Hash },

    #[error("block transaction root verification failed")]
    InvalidTxRoot,

    #[error("block spends sender nonce twice")]
    DuplicateTransaction,

    #[error("block holds {got} transactions, limit is {limit}")]
    TooManyTransactions { limit: usize, got: usize },

    #[error("genesis block must be empty")]
    NonEmptyGenesis,

    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl From<CryptoError> for ValidationError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AddressMismatch | CryptoError::InvalidAddress => {
                ValidationError::AddressMismatch
            }
            CryptoError::InvalidSignature | CryptoError::InvalidPublicKey => {
                ValidationError::InvalidSignature
            }
        }
    }
}

impl From<TransactionError> for ValidationError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::InvalidAmount => ValidationError::InvalidAmount,
            TransactionError::Crypto(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Transaction validator.
pub struct TransactionValidator;

impl TransactionValidator {
    /// Stateless validation: positive amount, key owns sender, signature valid.
    pub fn validate_transaction(tx: &Transaction) -> Result<()> {
        tx.check_stateless()?;
        Ok(())
    }
}

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Validate block structure and contents.
    pub fn validate_block_structure(block: &Block, max_transactions: usize) -> Result<()> {
        if block.is_genesis() && !block.transactions.is_empty() {
            return Err(ValidationError::NonEmptyGenesis);
        }

        if block.tx_count() > max_transactions {
            return Err(ValidationError::TooManyTransactions {
                limit: max_transactions,
                got: block.tx_count(),
            });
        }

        if !block.verify_tx_root() {
            return Err(ValidationError::InvalidTxRoot);
        }

        // One transaction per (sender, nonce) slot
        let mut seen = HashSet::new();
        for tx in &block.transactions {
            if !seen.insert(tx.slot()) {
                return Err(ValidationError::DuplicateTransaction);
            }
        }

        Ok(())
    }

    /// Validate block extends the parent correctly.
    pub fn validate_block_extends_parent(
        block: &Block,
        parent_hash: Hash,
        parent_index: u64,
    ) -> Result<()> {
        if block.header.index != parent_index + 1 {
            return Err(ValidationError::InvalidHeight {
                expected: parent_index + 1,
                got: block.header.index,
            });
        }

        if block.header.previous_hash != parent_hash {
            return Err(ValidationError::InvalidPrevHash {
                expected: parent_hash,
                got: block.header.previous_hash,
            });
        }

        Ok(())
    }

    /// Validate every transaction's signature and amount.
    pub fn validate_block_transactions(block: &Block) -> Result<()> {
        for tx in &block.transactions {
            TransactionValidator::validate_transaction(tx)?;
        }
        Ok(())
    }

    /// Validate proof of work and the reward/difficulty schedule.
    pub fn validate_work(block: &Block, config: &PowConfig, supply_before: u64) -> Result<()> {
        config.verify_schedule(block, supply_before)?;
        pow::verify_work(block)?;
        Ok(())
    }

    /// Full block validation against its parent.
    ///
    /// Cheap checks run first so an invalid block never costs a signature
    /// verification per transaction.
    pub fn validate_full(
        block: &Block,
        parent: &Block,
        supply_before: u64,
        config: &PowConfig,
        max_transactions: usize,
        now: u64,
    ) -> Result<()> {
        Self::validate_block_extends_parent(block, parent.hash, parent.header.index)?;
        Self::validate_work(block, config, supply_before)?;
        config.verify_timestamp(block, parent.header.timestamp, now)?;
        Self::validate_block_structure(block, max_transactions)?;
        Self::validate_block_transactions(block)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::{search, CancelToken, DifficultySchedule};
    use keyto_core::{Address, BlockHeader, Keypair};

    fn config() -> PowConfig {
        PowConfig {
            max_supply: 1_000,
            block_reward: 50,
            difficulty: DifficultySchedule::fixed(4),
            ..PowConfig::default()
        }
    }

    fn mined_child(parent: &Block, txs: Vec<Transaction>, miner: Address) -> Block {
        let candidate = Block::candidate(parent.index() + 1, parent.hash, txs, miner, 50, 4);
        search(candidate, &CancelToken::new()).unwrap()
    }

    #[test]
    fn test_valid_transfer_transaction() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);
        let tx = Transaction::transfer(keypair.address(), to, 1000, 0).signed(&keypair);

        assert!(TransactionValidator::validate_transaction(&tx).is_ok());
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);
        let mut tx = Transaction::transfer(keypair.address(), to, 1000, 0).signed(&keypair);
        tx.signature.0[0] ^= 0xFF;

        assert_eq!(
            TransactionValidator::validate_transaction(&tx),
            Err(ValidationError::InvalidSignature)
        );
    }

    #[test]
    fn test_foreign_key_rejected() {
        let owner = Keypair::generate();
        let other = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);
        let tx = Transaction::transfer(owner.address(), to, 1000, 0).signed(&other);

        assert_eq!(
            TransactionValidator::validate_transaction(&tx),
            Err(ValidationError::AddressMismatch)
        );
    }

    #[test]
    fn test_block_duplicate_slot_rejected() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);
        let tx1 = Transaction::transfer(keypair.address(), to, 1, 0).signed(&keypair);
        let tx2 = Transaction::transfer(keypair.address(), to, 2, 0).signed(&keypair);

        let block = Block::candidate(1, Hash::ZERO, vec![tx1, tx2], to, 50, 4);
        assert_eq!(
            BlockValidator::validate_block_structure(&block, 10),
            Err(ValidationError::DuplicateTransaction)
        );
    }

    #[test]
    fn test_block_tx_limit() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);
        let txs = (0..3)
            .map(|n| Transaction::transfer(keypair.address(), to, 1, n).signed(&keypair))
            .collect();

        let block = Block::candidate(1, Hash::ZERO, txs, to, 50, 4);
        assert!(matches!(
            BlockValidator::validate_block_structure(&block, 2),
            Err(ValidationError::TooManyTransactions { limit: 2, got: 3 })
        ));
    }

    #[test]
    fn test_block_extends_parent() {
        let genesis = Block::genesis(0);
        let miner = Address::from_bytes([3u8; 20]);
        let child = mined_child(&genesis, vec![], miner);

        assert!(BlockValidator::validate_block_extends_parent(&child, genesis.hash, 0).is_ok());
        assert!(matches!(
            BlockValidator::validate_block_extends_parent(&child, Hash([9u8; 32]), 0),
            Err(ValidationError::InvalidPrevHash { .. })
        ));
        assert!(matches!(
            BlockValidator::validate_block_extends_parent(&child, genesis.hash, 1),
            Err(ValidationError::InvalidHeight { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_full_block_validation() {
        let genesis = Block::genesis(0);
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);
        let tx = Transaction::transfer(keypair.address(), to, 5, 0).signed(&keypair);
        let now = BlockHeader::current_timestamp();

        let block = mined_child(&genesis, vec![tx], keypair.address());
        assert!(BlockValidator::validate_full(&block, &genesis, 0, &config(), 10, now).is_ok());

        // Rewriting a transaction after mining breaks the tx root and the work.
        let mut tampered = block.clone();
        tampered.transactions[0].amount = 6;
        assert!(BlockValidator::validate_full(&tampered, &genesis, 0, &config(), 10, now).is_err());
    }

    #[test]
    fn test_unmined_block_rejected() {
        let genesis = Block::genesis(0);
        let mut block = Block::candidate(1, genesis.hash, vec![], Address::ZERO, 50, 40);
        block.seal();
        let config = PowConfig {
            difficulty: DifficultySchedule::fixed(40),
            ..config()
        };
        let now = BlockHeader::current_timestamp();

        assert!(matches!(
            BlockValidator::validate_full(&block, &genesis, 0, &config, 10, now),
            Err(ValidationError::Consensus(ConsensusError::InvalidProofOfWork { .. }))
        ));
    }
}
