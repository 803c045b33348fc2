//! Shared domain types that cross module boundaries. `spec.md` §3.

use alloy_primitives::{Address, B256};
use ethereum_consensus::primitives::Root;
use serde::{Deserialize, Serialize};

/// `spec.md` §3 "FinalityInfo". Transient, fetched per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalityInfo {
    pub head_execution_block_hash: B256,
    pub safe_execution_block_hash: B256,
    pub finalized_execution_block_hash: B256,
}

/// `spec.md` §4.F step 7: which code path produced a `PayloadReadyEvent`. `Block` is the
/// plain core build; `RelayBid` is the payment-tx-injected variant from the relay path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSource {
    Block,
    RelayBid,
}

/// `spec.md` §3 "PayloadReadyEvent". Emitted exactly once per successful build per slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadReadyEvent {
    pub slot: u64,
    pub parent_block_root: B256,
    pub parent_block_hash: B256,
    /// the post-rewrite hash.
    pub block_hash: B256,
    pub payload: serde_json::Value,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub prev_randao: B256,
    pub fee_recipient: Address,
    pub block_value_gwei: u64,
    pub build_source: BuildSource,
    /// the slot's assigned proposer, carried through for the relay bid path's
    /// registration lookup and `BidTrace.proposerPubkey`.
    pub proposer_index: u64,
    /// unix seconds.
    pub ready_at: u64,
}

/// Converts an `ethereum_consensus` fixed-size root/hash type into `alloy_primitives::B256`.
pub fn root_to_b256(root: &Root) -> B256 {
    B256::from_slice(root.as_ref())
}
