//! Merkle commitment over a block's transactions.

use crate::hash::{hash_concat, Hash};
use crate::transaction::Transaction;

const LEAF_TAG: &[u8] = &[0x00];
const NODE_TAG: &[u8] = &[0x01];

/// Compute the merkle root of a list of hashes.
///
/// Leaves and interior nodes are hashed under different tags, and an odd
/// node at the end of a level is carried up unchanged rather than paired with
/// itself, so `[a, b, c]` and `[a, b, c, c]` commit to different roots.
/// Returns the zero hash if the list is empty.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    let mut level: Vec<Hash> = hashes
        .iter()
        .map(|h| hash_concat(&[LEAF_TAG, h.as_ref()]))
        .collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_concat(&[NODE_TAG, left.as_ref(), right.as_ref()]),
                _ => pair[0],
            })
            .collect();
    }

    level[0]
}

/// Merkle root of the transaction hashes, in block order.
pub fn transactions_root(transactions: &[Transaction]) -> Hash {
    let hashes: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
    merkle_root(&hashes)
}
