//! Per-address wallet state.

use serde::{Deserialize, Serialize};

/// Balance and counters tracked for an address.
///
/// Every address implicitly has a zeroed wallet; the ledger materializes one
/// on first reference and never removes it, so the nonce survives a zero
/// balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Spendable balance in the smallest unit.
    pub balance: u64,
    /// Number of blocks this address has been rewarded for.
    pub mined_blocks: u64,
    /// Number of outgoing transfers accepted so far.
    pub nonce: u64,
}

impl Wallet {
    /// Increment the nonce.
    pub fn increment_nonce(&mut self) {
        self.nonce = self.nonce.saturating_add(1);
    }

    /// Add balance to the wallet.
    pub fn credit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Check if the wallet has sufficient balance.
    pub fn has_balance(&self, amount: u64) -> bool {
        self.balance >= amount
    }
}
