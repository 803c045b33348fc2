//! Relay Bid Path. `spec.md` §4.H.

mod bid_trace;
mod client;
mod payload_format;
mod payment_tx;
mod requests;
pub mod validator_cache;

pub use bid_trace::BidTrace;
pub use client::{Error as RelayClientError, RelayClient, RelaySubmissionOutcome};
pub use payment_tx::{compute_payment_value, PaymentTxBuilder};
pub use requests::RelayExecutionRequests;
pub use validator_cache::ValidatorCache;

use crate::clock::Slot;
use crate::header;
use crate::types::PayloadReadyEvent;
use ethereum_consensus::{crypto::SecretKey, primitives::BlsPublicKey, state_transition::Context};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Header(#[from] header::Error),
    #[error(transparent)]
    BidTrace(#[from] bid_trace::Error),
    #[error(transparent)]
    PayloadFormat(#[from] payload_format::Error),
    #[error(transparent)]
    Requests(#[from] requests::Error),
    #[error(transparent)]
    PaymentTx(#[from] payment_tx::Error),
}

/// Per-slot-per-relay submission state. `spec.md` §4.H "State machine per slot per relay:
/// NEW -> SUBMITTED -> {ACCEPTED | FAILED}. No retries."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    New,
    Submitted,
    Accepted,
    Failed,
}

#[derive(Default)]
pub struct SubmissionTracker {
    state: RwLock<HashMap<(Slot, String), SubmissionState>>,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, slot: Slot, relay_url: &str, state: SubmissionState) {
        self.state.write().insert((slot, relay_url.to_string()), state);
    }

    pub fn get(&self, slot: Slot, relay_url: &str) -> Option<SubmissionState> {
        self.state.read().get(&(slot, relay_url.to_string())).copied()
    }

    /// Prunes entries for slots at or below `current_slot - 64`, alongside the other
    /// per-slot caches (`spec.md` §4.H "Cleanup").
    pub fn cleanup(&self, current_slot: Slot) {
        let floor = current_slot.saturating_sub(64);
        self.state.write().retain(|(slot, _), _| *slot > floor);
    }
}

/// Assembles and submits a bid built from a relay-variant `PayloadReadyEvent` (one whose
/// payload already has the payment transaction injected -- `spec.md` §4.H steps 2-3) to
/// every configured relay concurrently, recording each relay's outcome.
pub async fn submit_bid(
    event: &PayloadReadyEvent,
    proposer_public_key: &BlsPublicKey,
    builder_public_key: &BlsPublicKey,
    proposer_fee_recipient_for_trace: ethereum_consensus::primitives::ExecutionAddress,
    bid_value: ethereum_consensus::primitives::U256,
    signing_key: &SecretKey,
    context: &Context,
    relay_clients: &[RelayClient],
    tracker: &SubmissionTracker,
) -> Result<Vec<RelaySubmissionOutcome>, Error> {
    let mut trace = BidTrace {
        slot: event.slot,
        parent_hash: to_hash32(event.parent_block_hash),
        block_hash: to_hash32(event.block_hash),
        builder_public_key: builder_public_key.clone(),
        proposer_public_key: proposer_public_key.clone(),
        proposer_fee_recipient: proposer_fee_recipient_for_trace,
        gas_limit: event.gas_limit,
        gas_used: event.gas_used,
        value: bid_value,
    };
    let signature = bid_trace::sign(&mut trace, signing_key, context)?;

    let relay_payload = payload_format::to_relay_payload(&event.payload)?;
    let execution_requests = extract_execution_requests(&event.payload)?;

    let submission = serde_json::json!({
        "message": trace,
        "execution_payload": relay_payload,
        "execution_requests": execution_requests,
        "signature": signature,
    });

    for client in relay_clients {
        tracker.record(event.slot, client.url(), SubmissionState::Submitted);
    }
    let outcomes = client::submit_to_all(relay_clients, &submission).await;
    for outcome in &outcomes {
        let state = if outcome.result.is_ok() { SubmissionState::Accepted } else { SubmissionState::Failed };
        tracker.record(event.slot, &outcome.relay_url, state);
    }
    Ok(outcomes)
}

fn extract_execution_requests(payload: &serde_json::Value) -> Result<RelayExecutionRequests, Error> {
    let entries: Vec<Vec<u8>> = payload
        .get("executionRequests")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| hex::decode(s.trim_start_matches("0x")).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();
    Ok(requests::translate(&entries)?)
}

fn to_hash32(value: alloy_primitives::B256) -> ethereum_consensus::primitives::Hash32 {
    ethereum_consensus::primitives::Hash32::try_from(value.as_slice()).expect("32 bytes always converts")
}
