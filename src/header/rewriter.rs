//! Header Rewriter. `spec.md` §4.D.
//!
//! Reconstructs a block header from payload JSON + side-channel fields, verifies the
//! reconstruction reproduces the engine-reported block hash, then rewrites `extraData`
//! (prefixing it to brand the block) and recomputes the hash. Never returns a payload
//! whose original header we could not reproduce -- that's the one place this system
//! refuses to emit something it otherwise has (`spec.md` §7).

use super::rlp::{requests_hash, Header};
use super::trie::{transactions_root, withdrawals_root};
use super::types::ParsedPayload;
use alloy_primitives::B256;
use ethereum_consensus::primitives::Root;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] super::types::Error),
    #[error(
        "header verification failed: reconstructed hash {reconstructed} does not match \
         engine-reported hash {expected}, even after toggling requestsHash presence"
    )]
    VerificationFailed { expected: B256, reconstructed: B256 },
    #[error("could not serialize rewritten payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RewriteResult {
    /// The payload JSON with `extraData` and `blockHash` replaced.
    pub payload: serde_json::Value,
    pub new_block_hash: B256,
}

/// `spec.md` §4.D. `execution_requests` is `None` when the engine omitted the field
/// entirely (pre-Electra), `Some(vec![])` when present-but-empty, matching the tri-state
/// the engine client preserves.
pub fn rewrite(
    payload_json: &serde_json::Value,
    extra_data_prefix: &[u8],
    parent_beacon_root: Root,
    execution_requests: Option<&[Vec<u8>]>,
) -> Result<RewriteResult, Error> {
    let parsed = ParsedPayload::from_json(payload_json)?;
    let parent_beacon_root = B256::from_slice(parent_beacon_root.as_ref());

    let tx_root = transactions_root(&parsed.transactions);
    let withdrawals_root = parsed.withdrawals.as_deref().map(withdrawals_root);

    let (header, verified) =
        reconstruct_and_verify(&parsed, tx_root, withdrawals_root, parent_beacon_root, execution_requests)?;
    let _ = verified;

    let rewritten_header = header.with_rewritten_extra_data(extra_data_prefix);
    let new_hash = rewritten_header.hash();

    let mut payload = payload_json.clone();
    if let serde_json::Value::Object(ref mut map) = payload {
        map.insert(
            "extraData".to_string(),
            serde_json::Value::String(format!("0x{}", hex::encode(&rewritten_header.extra_data))),
        );
        map.insert("blockHash".to_string(), serde_json::Value::String(format!("0x{new_hash:x}")));
    }

    Ok(RewriteResult { payload, new_block_hash: new_hash })
}

/// Builds the header with the requested `requestsHash` presence and checks it against
/// the engine-reported `blockHash`. On mismatch, tries the opposite presence once
/// (`spec.md` §4.D step 5 fallback) before giving up.
fn reconstruct_and_verify(
    parsed: &ParsedPayload,
    tx_root: B256,
    withdrawals_root: Option<B256>,
    parent_beacon_root: B256,
    execution_requests: Option<&[Vec<u8>]>,
) -> Result<(Header, bool), Error> {
    let primary_hash = execution_requests.map(requests_hash);
    let header = Header::from_payload(parsed, tx_root, withdrawals_root, parent_beacon_root, primary_hash);
    if header.hash() == parsed.block_hash {
        return Ok((header, true));
    }

    let fallback_hash = match primary_hash {
        Some(_) => None,
        None => Some(requests_hash(&[])),
    };
    let fallback_header =
        Header::from_payload(parsed, tx_root, withdrawals_root, parent_beacon_root, fallback_hash);
    let reconstructed = fallback_header.hash();
    if reconstructed == parsed.block_hash {
        return Ok((fallback_header, true));
    }

    Err(Error::VerificationFailed { expected: parsed.block_hash, reconstructed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bloom, Bytes, U256};

    fn base_payload_json(block_hash: B256, extra_data: &str) -> serde_json::Value {
        serde_json::json!({
            "parentHash": format!("0x{}", "11".repeat(32)),
            "feeRecipient": format!("0x{}", "22".repeat(20)),
            "stateRoot": format!("0x{}", "33".repeat(32)),
            "receiptsRoot": format!("0x{}", "44".repeat(32)),
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "prevRandao": format!("0x{}", "55".repeat(32)),
            "blockNumber": "0x64",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x0",
            "timestamp": "0x65c00000",
            "extraData": extra_data,
            "baseFeePerGas": "0x7",
            "blockHash": format!("0x{block_hash:x}"),
            "transactions": Vec::<String>::new(),
        })
    }

    fn compute_expected_hash(extra_data: &[u8], requests: Option<&[Vec<u8>]>) -> B256 {
        let parsed = ParsedPayload {
            parent_hash: B256::repeat_byte(0x11),
            fee_recipient: Address::repeat_byte(0x22),
            state_root: B256::repeat_byte(0x33),
            receipts_root: B256::repeat_byte(0x44),
            logs_bloom: Bloom::ZERO,
            prev_randao: B256::repeat_byte(0x55),
            block_number: 0x64,
            gas_limit: 0x1c9c380,
            gas_used: 0,
            timestamp: 0x65c00000,
            extra_data: Bytes::from(extra_data.to_vec()),
            base_fee_per_gas: U256::from(7u64),
            block_hash: B256::ZERO,
            transactions: vec![],
            withdrawals: None,
            blob_gas_used: None,
            excess_blob_gas: None,
        };
        let parent_beacon_root = B256::repeat_byte(0x66);
        let tx_root = transactions_root(&[]);
        let requests_digest = requests.map(requests_hash);
        Header::from_payload(&parsed, tx_root, None, parent_beacon_root, requests_digest).hash()
    }

    #[test]
    fn rewrite_round_trips_when_header_matches() {
        let expected_hash = compute_expected_hash(&[], Some(&[]));
        let payload = base_payload_json(expected_hash, "0x");
        let parent_beacon_root = Root::try_from([0x66; 32].as_ref()).unwrap();

        let result = rewrite(&payload, b"buildoor/", parent_beacon_root, Some(&[])).unwrap();
        assert_ne!(result.new_block_hash, expected_hash);
        assert_eq!(result.payload["blockHash"].as_str().unwrap(), format!("0x{:x}", result.new_block_hash));
    }

    #[test]
    fn verification_fails_on_unreconcilable_hash() {
        let payload = base_payload_json(B256::repeat_byte(0xee), "0x");
        let parent_beacon_root = Root::try_from([0x66; 32].as_ref()).unwrap();
        let err = rewrite(&payload, b"buildoor/", parent_beacon_root, Some(&[])).unwrap_err();
        assert!(matches!(err, Error::VerificationFailed { .. }));
    }
}
