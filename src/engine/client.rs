//! Engine-API client. `spec.md` §4.C.
//!
//! Grounded on `mev-rs::engine_api_proxy::client::Client`: a `reqwest::Client` plus an
//! incrementing JSON-RPC id behind a `parking_lot::Mutex`, POSTing a `{jsonrpc, method,
//! params, id}` envelope with an `Authorization` header. The envelope itself is built by
//! hand with `serde_json::json!` rather than pulling in `anvil-rpc` (a foundry-rs git
//! dependency) for a four-field struct -- see DESIGN.md.

use super::jwt::JwtAuth;
use super::types::{
    EnginePayloadAttributes, EngineApiVersion, ExecutionRequests, ForkchoiceStateV1,
    ForkchoiceUpdatedParams, ForkchoiceUpdatedResult, GetPayloadResult, JsonRpcResponse,
    PayloadId, PayloadStatusKind, WithdrawalV1,
};
use crate::event_stream::{PayloadAttributesEvent, WithdrawalAttribute};
use ethereum_consensus::primitives::{ExecutionAddress, Hash32};
use parking_lot::Mutex;
use serde_json::json;
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("engine is unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
    #[error("engine rejected the request: {status:?} ({validation_error:?})")]
    Rejected { status: PayloadStatusKind, validation_error: Option<String> },
    #[error("engine returned no payload id alongside a VALID status")]
    MissingPayloadId,
    #[error("engine JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },
    #[error("engine response was missing its result")]
    MissingResult,
    #[error("could not parse block value: {0}")]
    BlockValue(String),
    #[error("no Engine-API version accepted the request (tried {tried:?})")]
    NoVersionAccepted { tried: Vec<EngineApiVersion> },
    #[error(transparent)]
    Jwt(#[from] super::jwt::Error),
}

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct EngineClient {
    http: reqwest::Client,
    endpoint: String,
    auth: JwtAuth,
    rpc_id: Arc<AtomicI64>,
}

impl EngineClient {
    pub fn new(endpoint: impl Into<String>, auth: JwtAuth) -> Self {
        Self {
            http: reqwest::Client::builder().timeout(HTTP_TIMEOUT).build().expect("valid client"),
            endpoint: endpoint.into(),
            auth,
            rpc_id: Arc::new(AtomicI64::new(0)),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, Error> {
        let id = self.rpc_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id });
        let token = self.auth.bearer_token()?;
        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", token)
            .json(&body)
            .send()
            .await?;
        let response: JsonRpcResponse<T> = response.json().await?;
        if let Some(error) = response.error {
            return Err(Error::JsonRpc { code: error.code, message: error.message });
        }
        response.result.ok_or(Error::MissingResult)
    }

    /// `RequestPayloadBuild(head, safe, finalized, attrs) -> PayloadID`. `spec.md` §4.C.1.
    /// Probes Engine-API versions from highest to lowest when `preferred` is `None`.
    pub async fn request_payload_build(
        &self,
        head: Hash32,
        safe: Hash32,
        finalized: Hash32,
        attrs: &PayloadAttributesEvent,
        fee_recipient: ExecutionAddress,
        preferred: Option<EngineApiVersion>,
    ) -> Result<(PayloadId, EngineApiVersion), Error> {
        let params = ForkchoiceUpdatedParams {
            forkchoice_state: ForkchoiceStateV1 {
                head_block_hash: head,
                safe_block_hash: safe,
                finalized_block_hash: finalized,
            },
            payload_attributes: Some(EnginePayloadAttributes {
                timestamp: attrs.timestamp,
                prev_randao: attrs.prev_randao,
                suggested_fee_recipient: fee_recipient,
                withdrawals: attrs.withdrawals.iter().map(withdrawal_v1).collect(),
                parent_beacon_block_root: attrs.parent_beacon_block_root,
            }),
        };

        let versions: Vec<EngineApiVersion> = match preferred {
            Some(v) => vec![v],
            None => EngineApiVersion::PROBE_ORDER.to_vec(),
        };

        let mut tried = Vec::new();
        for version in versions {
            let method = format!("engine_forkchoiceUpdated{}", version.method_suffix());
            let params_value = serde_json::to_value(&params).expect("serializable");
            match self.call::<ForkchoiceUpdatedResult>(&method, json!([params_value])).await {
                Ok(result) => {
                    return match result.payload_status.status {
                        PayloadStatusKind::Valid => {
                            result.payload_id.map(|id| (id, version)).ok_or(Error::MissingPayloadId)
                        }
                        status => Err(Error::Rejected {
                            status,
                            validation_error: result.payload_status.validation_error,
                        }),
                    };
                }
                Err(Error::JsonRpc { .. }) => {
                    tried.push(version);
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(Error::NoVersionAccepted { tried })
    }

    /// `GetPayloadRaw(id) -> (payloadJSON, blockValue, executionRequests|nil)`. `spec.md` §4.C.2.
    pub async fn get_payload_raw(
        &self,
        id: PayloadId,
        version: EngineApiVersion,
    ) -> Result<(serde_json::Value, ethereum_consensus::primitives::U256, ExecutionRequests), Error> {
        let method = format!("engine_getPayload{}", version.method_suffix());
        let result: GetPayloadResult = self.call(&method, json!([id])).await?;
        let block_value = parse_wei_hex(&result.block_value)?;
        Ok((result.execution_payload, block_value, result.execution_requests))
    }

    /// `ParseBlockHashFromPayload`. `spec.md` §4.C.
    pub fn parse_block_hash(payload: &serde_json::Value) -> Result<Hash32, Error> {
        let hash = payload
            .get("blockHash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::BlockValue("missing blockHash".to_string()))?;
        Hash32::try_from(hash).map_err(|_| Error::BlockValue(format!("bad blockHash {hash}")))
    }

    /// `ParsePayloadFields`: gasLimit, gasUsed, parentHash, blockHash. `spec.md` §4.C.
    pub fn parse_payload_fields(payload: &serde_json::Value) -> Result<PayloadFields, Error> {
        let field_hex_u64 = |name: &str| -> Result<u64, Error> {
            let s = payload
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::BlockValue(format!("missing {name}")))?;
            u64::from_str_radix(s.trim_start_matches("0x"), 16)
                .map_err(|_| Error::BlockValue(format!("bad {name} {s}")))
        };
        let field_hash = |name: &str| -> Result<Hash32, Error> {
            let s = payload
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::BlockValue(format!("missing {name}")))?;
            Hash32::try_from(s).map_err(|_| Error::BlockValue(format!("bad {name} {s}")))
        };
        Ok(PayloadFields {
            gas_limit: field_hex_u64("gasLimit")?,
            gas_used: field_hex_u64("gasUsed")?,
            parent_hash: field_hash("parentHash")?,
            block_hash: field_hash("blockHash")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PayloadFields {
    pub gas_limit: u64,
    pub gas_used: u64,
    pub parent_hash: Hash32,
    pub block_hash: Hash32,
}

fn withdrawal_v1(w: &WithdrawalAttribute) -> WithdrawalV1 {
    WithdrawalV1 { index: w.index, validator_index: w.validator_index, address: w.address, amount: w.amount }
}

fn parse_wei_hex(s: &str) -> Result<ethereum_consensus::primitives::U256, Error> {
    ethereum_consensus::primitives::U256::from_hex(s)
        .map_err(|_| Error::BlockValue(format!("bad blockValue {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_payload_fields_from_json() {
        let payload = json!({
            "gasLimit": "0x1c9c380",
            "gasUsed": "0xe4e1c0",
            "parentHash": format!("0x{}", "aa".repeat(32)),
            "blockHash": format!("0x{}", "bb".repeat(32)),
        });
        let fields = EngineClient::parse_payload_fields(&payload).unwrap();
        assert_eq!(fields.gas_limit, 0x1c9c380);
        assert_eq!(fields.gas_used, 0xe4e1c0);
    }

    #[test]
    fn block_hash_parse_rejects_missing_field() {
        let payload = json!({});
        assert!(EngineClient::parse_block_hash(&payload).is_err());
    }
}
