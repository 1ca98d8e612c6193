//! Signed value transfers.

use crate::crypto::{Address, CryptoError, KeyVerifier, Keypair, PublicKey, Signature};
use crate::hash::{CanonicalWriter, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain tag for transaction signing payloads.
const TX_SIGNING_DOMAIN: &[u8] = b"keytocoin/tx/v1";

/// Errors that can occur during transaction checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transfer amount must be positive")]
    InvalidAmount,

    #[error("signature rejected: {0}")]
    Crypto(#[from] CryptoError),
}

/// A transfer of `amount` from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sender's address; must equal the address of `public_key`.
    pub from: Address,
    /// Recipient's address.
    pub to: Address,
    /// Value to transfer, in the smallest unit.
    pub amount: u64,
    /// Sender's sequence number.
    pub nonce: u64,
    /// Signature over [`Transaction::signing_bytes`].
    pub signature: Signature,
    /// Sender's public key.
    pub public_key: PublicKey,
}

impl Transaction {
    /// Create an unsigned transfer. The key is attached by [`Transaction::sign`].
    pub fn transfer(from: Address, to: Address, amount: u64, nonce: u64) -> Self {
        Self {
            from,
            to,
            amount,
            nonce,
            signature: Signature::default(),
            public_key: PublicKey([0u8; 32]),
        }
    }

    /// Canonical bytes of (from, to, amount, nonce) that the sender signs.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::with_domain(TX_SIGNING_DOMAIN);
        w.put_fixed(self.from.as_bytes())
            .put_fixed(self.to.as_bytes())
            .put_u64(self.amount)
            .put_u64(self.nonce);
        w.into_bytes()
    }

    /// Identifier of the transaction, covering the signature and key too.
    pub fn hash(&self) -> Hash {
        let mut w = CanonicalWriter::new();
        w.put_bytes(&self.signing_bytes())
            .put_fixed(self.signature.as_bytes())
            .put_fixed(self.public_key.as_bytes());
        w.digest()
    }

    /// Sign the transaction with the given keypair.
    pub fn sign(&mut self, keypair: &Keypair) {
        self.public_key = keypair.public_key;
        self.signature = keypair.sign(&self.signing_bytes());
    }

    /// Create a signed transaction.
    pub fn signed(mut self, keypair: &Keypair) -> Self {
        self.sign(keypair);
        self
    }

    /// Verify that `public_key` owns `from` and signed this payload.
    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        KeyVerifier::check(
            &self.signing_bytes(),
            &self.signature,
            &self.public_key,
            &self.from,
        )
    }

    /// Stateless checks: positive amount and a valid signature.
    pub fn check_stateless(&self) -> Result<(), TransactionError> {
        if self.amount == 0 {
            return Err(TransactionError::InvalidAmount);
        }
        self.verify_signature()?;
        Ok(())
    }

    /// The (sender, nonce) slot this transaction consumes.
    pub fn slot(&self) -> (Address, u64) {
        (self.from, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);

        let tx = Transaction::transfer(keypair.address(), to, 1000, 0).signed(&keypair);

        assert!(tx.verify_signature().is_ok());
        assert!(tx.check_stateless().is_ok());
    }

    #[test]
    fn test_resigned_with_other_key_fails() {
        let owner = Keypair::generate();
        let other = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);

        let tx = Transaction::transfer(owner.address(), to, 1000, 0).signed(&other);

        assert_eq!(tx.verify_signature(), Err(CryptoError::AddressMismatch));
    }

    #[test]
    fn test_from_changed_after_signing_fails() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);

        let mut tx = Transaction::transfer(keypair.address(), to, 1000, 0).signed(&keypair);
        tx.from = Address::from_bytes([9u8; 20]);

        assert!(tx.verify_signature().is_err());
    }

    #[test]
    fn test_tampered_amount_fails() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);

        let mut tx = Transaction::transfer(keypair.address(), to, 1000, 0).signed(&keypair);
        tx.amount = 1_000_000;

        assert_eq!(tx.verify_signature(), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);

        let tx = Transaction::transfer(keypair.address(), to, 0, 0).signed(&keypair);

        assert_eq!(tx.check_stateless(), Err(TransactionError::InvalidAmount));
    }

    #[test]
    fn test_signing_bytes_ignore_signature() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);

        let unsigned = Transaction::transfer(keypair.address(), to, 5, 3);
        let signed = unsigned.clone().signed(&keypair);

        assert_eq!(unsigned.signing_bytes(), signed.signing_bytes());
        assert_ne!(unsigned.hash(), signed.hash());
    }

    #[test]
    fn test_transaction_hash_deterministic() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);

        let tx = Transaction::transfer(keypair.address(), to, 1000, 0).signed(&keypair);

        assert_eq!(tx.hash(), tx.hash());
    }

    #[test]
    fn test_json_field_names() {
        let keypair = Keypair::generate();
        let to = Address::from_bytes([2u8; 20]);
        let tx = Transaction::transfer(keypair.address(), to, 7, 0).signed(&keypair);

        let value = serde_json::to_value(&tx).unwrap();
        assert!(value.get("publicKey").is_some());
        assert_eq!(value["amount"], 7);

        let back: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(back, tx);
    }
}
