//! Typed SSE payloads. `spec.md` §3 "PayloadAttributesEvent" and §6 inbound SSE shapes.
//!
//! Hex-string decoding helpers mirror `mev-rs::engine_api_proxy::types::u64_from_hex` /
//! `u256_from_be_hex`: reject length mismatches rather than silently truncating.

use ethereum_consensus::primitives::{ExecutionAddress, Hash32, Root, Slot, ValidatorIndex};
use serde::{Deserialize, Deserializer};

pub(crate) fn u64_from_decimal_str<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<u64>().map_err(serde::de::Error::custom)
}

/// `spec.md` §3 Withdrawal entry inside payload attributes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WithdrawalAttribute {
    #[serde(deserialize_with = "u64_from_decimal_str")]
    pub index: u64,
    #[serde(deserialize_with = "u64_from_decimal_str", rename = "validator_index")]
    pub validator_index: u64,
    pub address: ExecutionAddress,
    #[serde(deserialize_with = "u64_from_decimal_str")]
    pub amount: u64,
}

/// The `data.payload_attributes` sub-object of the `payload_attributes` SSE event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
struct RawPayloadAttributes {
    #[serde(deserialize_with = "u64_from_decimal_str")]
    timestamp: u64,
    prev_randao: Hash32,
    suggested_fee_recipient: ExecutionAddress,
    #[serde(default)]
    withdrawals: Option<Vec<WithdrawalAttribute>>,
    parent_beacon_block_root: Root,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
struct RawPayloadAttributesData {
    #[serde(deserialize_with = "u64_from_decimal_str")]
    proposal_slot: Slot,
    #[serde(deserialize_with = "u64_from_decimal_str")]
    proposer_index: ValidatorIndex,
    parent_block_root: Root,
    #[serde(deserialize_with = "u64_from_decimal_str")]
    parent_block_number: u64,
    parent_block_hash: Hash32,
    payload_attributes: RawPayloadAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPayloadAttributesEvent {
    pub version: String,
    data: RawPayloadAttributesData,
}

/// `spec.md` §3 "PayloadAttributesEvent". The latest observed one wins per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadAttributesEvent {
    pub version: String,
    pub proposal_slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_block_root: Root,
    pub parent_block_number: u64,
    pub parent_block_hash: Hash32,
    pub timestamp: u64,
    pub prev_randao: Hash32,
    pub suggested_fee_recipient: ExecutionAddress,
    pub withdrawals: Vec<WithdrawalAttribute>,
    pub parent_beacon_block_root: Root,
    pub received_at: std::time::SystemTime,
}

impl From<RawPayloadAttributesEvent> for PayloadAttributesEvent {
    fn from(raw: RawPayloadAttributesEvent) -> Self {
        let RawPayloadAttributesEvent { version, data } = raw;
        Self {
            version,
            proposal_slot: data.proposal_slot,
            proposer_index: data.proposer_index,
            parent_block_root: data.parent_block_root,
            parent_block_number: data.parent_block_number,
            parent_block_hash: data.parent_block_hash,
            timestamp: data.payload_attributes.timestamp,
            prev_randao: data.payload_attributes.prev_randao,
            suggested_fee_recipient: data.payload_attributes.suggested_fee_recipient,
            withdrawals: data.payload_attributes.withdrawals.unwrap_or_default(),
            parent_beacon_block_root: data.payload_attributes.parent_beacon_block_root,
            received_at: std::time::SystemTime::now(),
        }
    }
}

/// `head` topic. Logged only; not a build trigger (`spec.md` §4.G).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HeadEvent {
    #[serde(deserialize_with = "u64_from_decimal_str")]
    pub slot: Slot,
    pub block: Root,
    pub state: Root,
    pub epoch_transition: bool,
    pub execution_optimistic: bool,
    pub previous_duty_dependent_root: Root,
    pub current_duty_dependent_root: Root,
}

/// Gloas-era `execution_payload_bid` / `execution_payload_envelope` /
/// `execution_payload_available` topics: consumed to update "last known payload" state
/// (`spec.md` §9 open question) but never used to trigger a build directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionPayloadEnvelopeEvent {
    #[serde(deserialize_with = "u64_from_decimal_str")]
    pub slot: Slot,
    pub block_hash: Hash32,
    pub beacon_block_root: Root,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionPayloadAvailableEvent {
    #[serde(deserialize_with = "u64_from_decimal_str")]
    pub slot: Slot,
    pub beacon_block_root: Root,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionPayloadBidEvent {
    #[serde(deserialize_with = "u64_from_decimal_str")]
    pub slot: Slot,
    pub block_hash: Hash32,
    pub parent_block_hash: Hash32,
}

/// Any one of the topics `spec.md` §4.B enumerates.
#[derive(Debug, Clone)]
pub enum Topic {
    Head,
    PayloadAttributes,
    ExecutionPayloadBid,
    ExecutionPayloadEnvelope,
    ExecutionPayloadAvailable,
    Attestation,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::PayloadAttributes => "payload_attributes",
            Self::ExecutionPayloadBid => "execution_payload_bid",
            Self::ExecutionPayloadEnvelope => "execution_payload_envelope",
            Self::ExecutionPayloadAvailable => "execution_payload_available",
            Self::Attestation => "attestation",
        }
    }
}

/// Typed union fired on the per-topic dispatchers in `BuilderService`'s run loop.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Head(HeadEvent),
    PayloadAttributes(PayloadAttributesEvent),
    ExecutionPayloadBid(ExecutionPayloadBidEvent),
    ExecutionPayloadEnvelope(ExecutionPayloadEnvelopeEvent),
    ExecutionPayloadAvailable(ExecutionPayloadAvailableEvent),
}

pub(crate) fn parse_payload_attributes(data: &str) -> Result<PayloadAttributesEvent, serde_json::Error> {
    let raw: RawPayloadAttributesEvent = serde_json::from_str(data)?;
    Ok(raw.into())
}
