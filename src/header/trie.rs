//! Ordered trie roots for `transactionsRoot` / `withdrawalsRoot`. `spec.md` §4.D step 2:
//! "the same algorithm Ethereum uses for block transaction roots" -- the Merkle-Patricia
//! trie keyed by the RLP encoding of each item's list index. `alloy-trie` is the
//! `alloy-rs` ecosystem's implementation of exactly this (the same one `reth`, whose own
//! workspace the teacher vendors as a dependency, uses for `calculate_transaction_root` /
//! `calculate_withdrawals_root`), so we reach for it rather than hand-rolling an MPT.

use super::types::Withdrawal;
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Encodable;
use alloy_trie::root::ordered_trie_root_with_encoder;

pub fn transactions_root(transactions: &[Bytes]) -> B256 {
    // Transactions are already RLP-encoded byte strings in the payload JSON; the trie
    // value at each index is the raw encoded transaction itself.
    ordered_trie_root_with_encoder(transactions, |tx, buf| buf.put_slice(tx))
}

pub fn withdrawals_root(withdrawals: &[Withdrawal]) -> B256 {
    ordered_trie_root_with_encoder(withdrawals, |w, buf| {
        WithdrawalRlp {
            index: w.index,
            validator_index: w.validator_index,
            address: w.address,
            amount: w.amount,
        }
        .encode(buf)
    })
}

#[derive(alloy_rlp::RlpEncodable)]
struct WithdrawalRlp {
    index: u64,
    validator_index: u64,
    address: alloy_primitives::Address,
    amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transactions_yield_the_well_known_empty_root() {
        let root = transactions_root(&[]);
        assert_eq!(
            root,
            "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
                .parse::<B256>()
                .unwrap()
        );
    }
}
