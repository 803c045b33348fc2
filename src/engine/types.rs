//! Engine-API wire types. `spec.md` §3 "PayloadID", "BuiltPayload", §4.C, §6.

use ethereum_consensus::primitives::{ExecutionAddress, Hash32};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fork-specific `engine_forkchoiceUpdatedV{N}` / `engine_getPayloadV{N}` suffix.
/// `spec.md` §4.C: "the `N` chosen corresponds to the active fork; if unknown, probe
/// from highest to lowest."
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EngineApiVersion {
    V3,
    V4,
    V5,
}

impl EngineApiVersion {
    /// Highest-to-lowest probe order, per `spec.md` §4.C.
    pub const PROBE_ORDER: [EngineApiVersion; 3] =
        [EngineApiVersion::V5, EngineApiVersion::V4, EngineApiVersion::V3];

    pub fn method_suffix(self) -> &'static str {
        match self {
            Self::V3 => "V3",
            Self::V4 => "V4",
            Self::V5 => "V5",
        }
    }
}

impl fmt::Display for EngineApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method_suffix())
    }
}

/// Opaque 8-byte engine handle. `spec.md` §3 "PayloadID".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadId(#[serde(with = "hex_bytes8")] pub [u8; 8]);

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

mod hex_bytes8 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 8], D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(format!("expected 8 bytes, got {}", bytes.len()))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceStateV1 {
    pub head_block_hash: Hash32,
    pub safe_block_hash: Hash32,
    pub finalized_block_hash: Hash32,
}

fn hex_u64<S: serde::Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{value:x}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalV1 {
    #[serde(serialize_with = "hex_u64")]
    pub index: u64,
    #[serde(serialize_with = "hex_u64", rename = "validatorIndex")]
    pub validator_index: u64,
    pub address: ExecutionAddress,
    #[serde(serialize_with = "hex_u64")]
    pub amount: u64,
}

/// The payload-attributes object sent with `forkchoiceUpdated`. `spec.md` §4.C.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnginePayloadAttributes {
    #[serde(serialize_with = "hex_u64")]
    pub timestamp: u64,
    pub prev_randao: Hash32,
    pub suggested_fee_recipient: ExecutionAddress,
    pub withdrawals: Vec<WithdrawalV1>,
    pub parent_beacon_block_root: Hash32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceUpdatedParams {
    pub forkchoice_state: ForkchoiceStateV1,
    pub payload_attributes: Option<EnginePayloadAttributes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadStatusKind {
    Valid,
    Invalid,
    Syncing,
    Accepted,
    InvalidBlockHash,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatusV1 {
    pub status: PayloadStatusKind,
    #[serde(default)]
    pub validation_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceUpdatedResult {
    pub payload_status: PayloadStatusV1,
    pub payload_id: Option<PayloadId>,
}

/// `executionRequests`' presence/absence changes header composition (`spec.md` §9).
/// `None` = field absent from the engine response; `Some(vec![])` = present but empty;
/// `Some(nonempty)` = present with entries.
pub type ExecutionRequests = Option<Vec<Vec<u8>>>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPayloadResult {
    pub execution_payload: serde_json::Value,
    pub block_value: String,
    #[serde(default, deserialize_with = "deserialize_execution_requests")]
    pub execution_requests: ExecutionRequests,
}

fn deserialize_execution_requests<'de, D>(
    deserializer: D,
) -> Result<ExecutionRequests, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(entries) => {
            let mut decoded = Vec::with_capacity(entries.len());
            for entry in entries {
                let entry = entry.strip_prefix("0x").unwrap_or(&entry);
                decoded.push(hex::decode(entry).map_err(serde::de::Error::custom)?);
            }
            Ok(Some(decoded))
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<T> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}
