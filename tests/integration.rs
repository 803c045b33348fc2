//! Drives the payload builder's full pipeline (beacon finality lookup -> engine
//! forkchoice/getPayload -> header rewrite) against hand-rolled mock beacon and engine
//! HTTP servers, the way `mev_boost_rs`'s own end-to-end test drives `Service` against an
//! in-process `relay_server::Server`.

use alloy_primitives::{Address, Bloom, Bytes, B256, U256 as AU256};
use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Json, Router};
use buildoor::beacon_client::BeaconClient;
use buildoor::builder::PayloadBuilder;
use buildoor::engine::{EngineClient, JwtAuth};
use buildoor::event_stream::{PayloadAttributesEvent, WithdrawalAttribute};
use buildoor::header::{transactions_root, Header, ParsedPayload};
use ethereum_consensus::primitives::{ExecutionAddress, Hash32, Root};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

const SECRET_HEX: &str = "11111111111111111111111111111111111111111111111111111111111111";

fn write_jwt_secret() -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("buildoor-test-jwt-{}.hex", std::process::id()));
    std::fs::write(&path, SECRET_HEX).unwrap();
    path
}

fn repeat_hash(byte: u8) -> String {
    format!("0x{}", hex::encode([byte; 32]))
}

/// The hash the engine reports alongside the un-rewritten payload below, computed with
/// the header rewriter's own public API so the verification step it runs internally
/// (recompute-then-compare against this value) actually succeeds.
fn engine_reported_block_hash() -> B256 {
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
        extra_data: Bytes::new(),
        base_fee_per_gas: AU256::from(7u64),
        block_hash: B256::ZERO,
        transactions: vec![],
        withdrawals: None,
        blob_gas_used: None,
        excess_blob_gas: None,
    };
    let parent_beacon_root = B256::repeat_byte(0x66);
    let tx_root = transactions_root(&[]);
    let requests_digest = buildoor::header::requests_hash(&[]);
    Header::from_payload(&parsed, tx_root, None, parent_beacon_root, Some(requests_digest)).hash()
}

fn execution_payload_json() -> Value {
    json!({
        "parentHash": repeat_hash(0x11),
        "feeRecipient": format!("0x{}", hex::encode([0x22u8; 20])),
        "stateRoot": repeat_hash(0x33),
        "receiptsRoot": repeat_hash(0x44),
        "logsBloom": format!("0x{}", hex::encode([0u8; 256])),
        "prevRandao": repeat_hash(0x55),
        "blockNumber": "0x64",
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": "0x65c00000",
        "extraData": "0x",
        "baseFeePerGas": "0x7",
        "blockHash": format!("0x{:x}", engine_reported_block_hash()),
        "transactions": Vec::<String>::new(),
    })
}

async fn start_beacon_mock() -> SocketAddr {
    async fn finality_checkpoints() -> Json<Value> {
        Json(json!({
            "data": {
                "finalized": { "root": repeat_hash(0x99) },
                "current_justified": { "root": repeat_hash(0x98) },
            }
        }))
    }

    async fn block(Path(_id): Path<String>) -> Json<Value> {
        Json(json!({
            "data": {
                "message": {
                    "body": {
                        "execution_payload": { "block_hash": repeat_hash(0x77) }
                    }
                }
            }
        }))
    }

    let app = Router::new()
        .route("/eth/v1/beacon/states/head/finality_checkpoints", get(finality_checkpoints))
        .route("/eth/v1/beacon/blocks/:id", get(block));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener.into_std().unwrap()).unwrap().serve(app.into_make_service()).await.unwrap();
    });
    addr
}

async fn start_engine_mock() -> SocketAddr {
    async fn rpc(Json(body): Json<Value>) -> Json<Value> {
        let id = body["id"].clone();
        let method = body["method"].as_str().unwrap_or_default();
        let result = if method == "engine_forkchoiceUpdatedV5" {
            json!({ "payloadStatus": { "status": "VALID" }, "payloadId": "0x0000000000000001" })
        } else if method == "engine_getPayloadV5" {
            json!({
                "executionPayload": execution_payload_json(),
                "blockValue": "0xde0b6b3a7640000",
                "executionRequests": Vec::<String>::new(),
            })
        } else {
            json!(null)
        };
        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    let app = Router::new().route("/", post(rpc));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener.into_std().unwrap()).unwrap().serve(app.into_make_service()).await.unwrap();
    });
    addr
}

fn sample_attributes() -> PayloadAttributesEvent {
    PayloadAttributesEvent {
        version: "deneb".to_string(),
        proposal_slot: 42,
        proposer_index: 7,
        parent_block_root: Root::try_from([0x12; 32].as_ref()).unwrap(),
        parent_block_number: 99,
        parent_block_hash: Hash32::try_from([0x11; 32].as_ref()).unwrap(),
        timestamp: 0x65c00000,
        prev_randao: Hash32::try_from([0x55; 32].as_ref()).unwrap(),
        suggested_fee_recipient: ExecutionAddress::try_from([0x22; 20].as_ref()).unwrap(),
        withdrawals: Vec::<WithdrawalAttribute>::new(),
        parent_beacon_block_root: Root::try_from([0x66; 32].as_ref()).unwrap(),
        received_at: SystemTime::now(),
    }
}

#[tokio::test]
async fn builds_a_payload_end_to_end_against_mock_beacon_and_engine() {
    let beacon_addr = start_beacon_mock().await;
    let engine_addr = start_engine_mock().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let beacon = BeaconClient::new(format!("http://{beacon_addr}")).unwrap();
    let jwt_path = write_jwt_secret();
    let auth = JwtAuth::from_hex_file(jwt_path.to_str().unwrap()).unwrap();
    let engine = EngineClient::new(format!("http://{engine_addr}/"), auth);
    let fee_recipient = ExecutionAddress::try_from([0x22u8; 20].as_ref()).unwrap();

    let builder = PayloadBuilder::new(engine, beacon, fee_recipient, Duration::from_millis(0));

    let attrs = sample_attributes();
    let event = builder.build_payload_from_attributes(&attrs).await.unwrap();

    assert_eq!(event.slot, 42);
    assert_eq!(event.gas_limit, 0x1c9c380);
    assert_eq!(event.gas_used, 0);
    assert_eq!(event.proposer_index, 7);
    assert_eq!(event.block_value_gwei, 1_000_000_000);
    assert_ne!(event.block_hash, engine_reported_block_hash());

    let extra_data = event.payload["extraData"].as_str().unwrap();
    let bytes = hex::decode(extra_data.trim_start_matches("0x")).unwrap();
    assert!(bytes.starts_with(b"buildoor/"));

    std::fs::remove_file(jwt_path).ok();
}

#[tokio::test]
async fn second_concurrent_build_for_the_same_slot_cancels_the_first() {
    let beacon_addr = start_beacon_mock().await;
    let engine_addr = start_engine_mock().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let beacon = BeaconClient::new(format!("http://{beacon_addr}")).unwrap();
    let jwt_path = write_jwt_secret();
    let auth = JwtAuth::from_hex_file(jwt_path.to_str().unwrap()).unwrap();
    let engine = EngineClient::new(format!("http://{engine_addr}/"), auth);
    let fee_recipient = ExecutionAddress::try_from([0x22u8; 20].as_ref()).unwrap();

    let builder = std::sync::Arc::new(PayloadBuilder::new(engine, beacon, fee_recipient, Duration::from_millis(200)));
    let attrs = sample_attributes();

    let first = {
        let builder = builder.clone();
        let attrs = attrs.clone();
        tokio::spawn(async move { builder.build_payload_from_attributes(&attrs).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = builder.build_payload_from_attributes(&attrs).await;

    let first = first.await.unwrap();
    assert!(matches!(first, Err(buildoor::builder::Error::Cancelled(42))));
    assert!(second.is_ok());

    std::fs::remove_file(jwt_path).ok();
}
