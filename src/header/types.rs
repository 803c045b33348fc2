//! Typed view over the engine-API execution-payload JSON. `spec.md` §3 "Header
//! (reconstructed)" / §4.D step 1.

use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("payload missing field `{0}`")]
    MissingField(&'static str),
    #[error("payload field `{0}` had the wrong shape: {1}")]
    BadField(&'static str, String),
    #[error("extraData exceeds 32 bytes ({0})")]
    ExtraDataTooLong(usize),
}

/// Every field the engine-API execution-payload JSON carries, parsed into fixed-width
/// types. Optional fork-gated fields are `None` when the payload predates that fork.
#[derive(Debug, Clone)]
pub struct ParsedPayload {
    pub parent_hash: B256,
    pub fee_recipient: Address,
    pub state_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub prev_randao: B256,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub base_fee_per_gas: U256,
    pub block_hash: B256,
    /// RLP-encoded transactions, as the payload carries them.
    pub transactions: Vec<Bytes>,
    pub withdrawals: Option<Vec<Withdrawal>>,
    pub blob_gas_used: Option<u64>,
    pub excess_blob_gas: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: Address,
    pub amount: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWithdrawal {
    index: String,
    validator_index: String,
    address: Address,
    amount: String,
}

fn hex_u64(value: &str, field: &'static str) -> Result<u64, Error> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|_| Error::BadField(field, value.to_string()))
}

fn get_str<'a>(value: &'a serde_json::Value, field: &'static str) -> Result<&'a str, Error> {
    value.get(field).and_then(|v| v.as_str()).ok_or(Error::MissingField(field))
}

fn get_hex_u64(value: &serde_json::Value, field: &'static str) -> Result<u64, Error> {
    hex_u64(get_str(value, field)?, field)
}

fn get_b256(value: &serde_json::Value, field: &'static str) -> Result<B256, Error> {
    let s = get_str(value, field)?;
    s.parse::<B256>().map_err(|_| Error::BadField(field, s.to_string()))
}

fn get_address(value: &serde_json::Value, field: &'static str) -> Result<Address, Error> {
    let s = get_str(value, field)?;
    s.parse::<Address>().map_err(|_| Error::BadField(field, s.to_string()))
}

impl ParsedPayload {
    pub fn from_json(payload: &serde_json::Value) -> Result<Self, Error> {
        let logs_bloom_str = get_str(payload, "logsBloom")?;
        let logs_bloom = logs_bloom_str
            .parse::<Bloom>()
            .map_err(|_| Error::BadField("logsBloom", logs_bloom_str.to_string()))?;

        let extra_data_str = get_str(payload, "extraData")?;
        let extra_data = Bytes::from(
            hex::decode(extra_data_str.trim_start_matches("0x"))
                .map_err(|_| Error::BadField("extraData", extra_data_str.to_string()))?,
        );
        if extra_data.len() > 32 {
            return Err(Error::ExtraDataTooLong(extra_data.len()));
        }

        let base_fee_str = get_str(payload, "baseFeePerGas")?;
        let base_fee_per_gas = U256::from_str_radix(base_fee_str.trim_start_matches("0x"), 16)
            .map_err(|_| Error::BadField("baseFeePerGas", base_fee_str.to_string()))?;

        let transactions = payload
            .get("transactions")
            .and_then(|v| v.as_array())
            .ok_or(Error::MissingField("transactions"))?
            .iter()
            .map(|tx| {
                let s = tx.as_str().ok_or(Error::BadField("transactions", tx.to_string()))?;
                hex::decode(s.trim_start_matches("0x"))
                    .map(Bytes::from)
                    .map_err(|_| Error::BadField("transactions", s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let withdrawals = match payload.get("withdrawals") {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => {
                let raw: Vec<RawWithdrawal> = serde_json::from_value(value.clone())
                    .map_err(|e| Error::BadField("withdrawals", e.to_string()))?;
                let mut out = Vec::with_capacity(raw.len());
                for w in raw {
                    out.push(Withdrawal {
                        index: hex_u64(&w.index, "withdrawals[].index")?,
                        validator_index: hex_u64(&w.validator_index, "withdrawals[].validatorIndex")?,
                        address: w.address,
                        amount: hex_u64(&w.amount, "withdrawals[].amount")?,
                    });
                }
                Some(out)
            }
        };

        let blob_gas_used = match payload.get("blobGasUsed") {
            None | Some(serde_json::Value::Null) => None,
            Some(_) => Some(get_hex_u64(payload, "blobGasUsed")?),
        };
        let excess_blob_gas = match payload.get("excessBlobGas") {
            None | Some(serde_json::Value::Null) => None,
            Some(_) => Some(get_hex_u64(payload, "excessBlobGas")?),
        };

        Ok(Self {
            parent_hash: get_b256(payload, "parentHash")?,
            fee_recipient: get_address(payload, "feeRecipient")?,
            state_root: get_b256(payload, "stateRoot")?,
            receipts_root: get_b256(payload, "receiptsRoot")?,
            logs_bloom,
            prev_randao: get_b256(payload, "prevRandao")?,
            block_number: get_hex_u64(payload, "blockNumber")?,
            gas_limit: get_hex_u64(payload, "gasLimit")?,
            gas_used: get_hex_u64(payload, "gasUsed")?,
            timestamp: get_hex_u64(payload, "timestamp")?,
            extra_data,
            base_fee_per_gas,
            block_hash: get_b256(payload, "blockHash")?,
            transactions,
            withdrawals,
            blob_gas_used,
            excess_blob_gas,
        })
    }
}

/// Post-merge constant: `Keccak(RLP([]))`.
pub fn empty_uncle_hash() -> B256 {
    "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
        .parse()
        .expect("well-known constant")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_uncle_hash_parses_as_a_full_32_byte_hash() {
        assert_eq!(empty_uncle_hash().as_slice().len(), 32);
    }
}

pub fn zero_nonce() -> B64 {
    B64::ZERO
}
