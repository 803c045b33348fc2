//! Payload Builder. `spec.md` §4.F.
//!
//! Grounded on the teacher's `mev-build-rs::auctioneer::service` build pipeline (fetch
//! attributes -> drive the engine -> sign/assemble a submission) generalized to this
//! system's simpler single-engine, no-auction shape, and on `mev-build-rs::builder`'s
//! `(slot, cancelHandle)` active-build bookkeeping.

mod active_build;

pub use active_build::ActiveBuild;

use crate::beacon_client::BeaconClient;
use crate::clock::Slot;
use crate::engine::{EngineApiVersion, EngineClient};
use crate::event_stream::PayloadAttributesEvent;
use crate::header;
use crate::types::{BuildSource, PayloadReadyEvent};
use ethereum_consensus::primitives::{ExecutionAddress, Root};
use parking_lot::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const EXTRA_DATA_PREFIX: &[u8] = b"buildoor/";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] crate::engine::Error),
    #[error(transparent)]
    Header(#[from] header::Error),
    #[error(transparent)]
    Beacon(#[from] crate::beacon_client::Error),
    #[error("build for slot {0} was cancelled")]
    Cancelled(Slot),
}

/// Drives the Engine-API client and header rewriter to turn a `PayloadAttributesEvent`
/// into a `PayloadReadyEvent`, tracking the single in-flight build.
pub struct PayloadBuilder {
    engine: EngineClient,
    beacon: BeaconClient,
    active: ActiveBuild,
    fee_recipient: Mutex<ExecutionAddress>,
    payload_build_time: Duration,
    engine_api_version: Mutex<Option<EngineApiVersion>>,
}

impl PayloadBuilder {
    pub fn new(
        engine: EngineClient,
        beacon: BeaconClient,
        fee_recipient: ExecutionAddress,
        payload_build_time: Duration,
    ) -> Self {
        Self {
            engine,
            beacon,
            active: ActiveBuild::new(),
            fee_recipient: Mutex::new(fee_recipient),
            payload_build_time,
            engine_api_version: Mutex::new(None),
        }
    }

    /// `SetFeeRecipient(addr)`: affects future builds only.
    pub fn set_fee_recipient(&self, address: ExecutionAddress) {
        *self.fee_recipient.lock() = address;
    }

    /// `AbortBuild(slot)`.
    pub fn abort_build(&self, slot: Slot) {
        self.active.abort(slot);
    }

    /// `BuildPayloadFromAttributes`. `spec.md` §4.F.
    pub async fn build_payload_from_attributes(
        &self,
        attrs: &PayloadAttributesEvent,
    ) -> Result<PayloadReadyEvent, Error> {
        let slot = attrs.proposal_slot;
        let cancel = self.active.start(slot);

        let result = self.build_inner(attrs, &cancel).await;
        self.active.clear_if(slot);
        result
    }

    async fn build_inner(
        &self,
        attrs: &PayloadAttributesEvent,
        cancel: &CancellationToken,
    ) -> Result<PayloadReadyEvent, Error> {
        let slot = attrs.proposal_slot;

        let finality = tokio::select! {
            result = self.beacon.finality_info(alloy_primitives::B256::from_slice(attrs.parent_block_hash.as_ref())) => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled(slot)),
        };

        let fee_recipient = *self.fee_recipient.lock();
        let preferred = *self.engine_api_version.lock();

        let (payload_id, version) = tokio::select! {
            result = self.engine.request_payload_build(
                to_hash32(finality.head_execution_block_hash),
                to_hash32(finality.safe_execution_block_hash),
                to_hash32(finality.finalized_execution_block_hash),
                attrs,
                fee_recipient,
                preferred,
            ) => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled(slot)),
        };
        *self.engine_api_version.lock() = Some(version);

        if !self.payload_build_time.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.payload_build_time) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled(slot)),
            }
        }

        let (payload_json, block_value, execution_requests) = tokio::select! {
            result = self.engine.get_payload_raw(payload_id, version) => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled(slot)),
        };

        let parent_beacon_root: Root = attrs.parent_beacon_block_root;
        let rewritten = header::rewrite(
            &payload_json,
            EXTRA_DATA_PREFIX,
            parent_beacon_root,
            execution_requests.as_deref(),
        )?;

        let fields = EngineClient::parse_payload_fields(&rewritten.payload)
            .map_err(Error::Engine)
            .or_else(|_| EngineClient::parse_payload_fields(&payload_json).map_err(Error::Engine))?;

        let block_value_gwei = (block_value / ethereum_consensus::primitives::U256::from(1_000_000_000u64))
            .try_into()
            .unwrap_or(u64::MAX);

        Ok(PayloadReadyEvent {
            slot,
            parent_block_root: crate::types::root_to_b256(&attrs.parent_block_root),
            parent_block_hash: alloy_primitives::B256::from_slice(attrs.parent_block_hash.as_ref()),
            block_hash: rewritten.new_block_hash,
            payload: rewritten.payload,
            timestamp: attrs.timestamp,
            gas_limit: fields.gas_limit,
            gas_used: fields.gas_used,
            prev_randao: alloy_primitives::B256::from_slice(attrs.prev_randao.as_ref()),
            fee_recipient: alloy_primitives::Address::from_slice(fee_recipient.as_ref()),
            block_value_gwei,
            build_source: BuildSource::Block,
            proposer_index: attrs.proposer_index,
            ready_at: now_unix(),
        })
    }
}

fn to_hash32(value: alloy_primitives::B256) -> ethereum_consensus::primitives::Hash32 {
    ethereum_consensus::primitives::Hash32::try_from(value.as_slice())
        .expect("32 bytes always converts")
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("after epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_data_prefix_is_the_documented_brand() {
        assert_eq!(EXTRA_DATA_PREFIX, b"buildoor/");
    }
}
