//! Beacon REST client. `spec.md` §6 "Inbound from beacon node (REST)": genesis, chain spec,
//! finality checkpoints, block lookups, and validator-index resolution the builder and
//! relay path need per build.
//!
//! Genesis lookup is grounded on `mev-rs::genesis::get_genesis_time`'s use of
//! `beacon_api_client::mainnet::Client::get_genesis_details`. The remaining lookups have no
//! teacher counterpart, so they're hand-rolled REST calls in the same style as
//! `engine::client::EngineClient` -- a plain `reqwest::Client` plus typed response structs
//! for each endpoint `spec.md` §6 names.

use crate::types::FinalityInfo;
use alloy_primitives::B256;
use beacon_api_client::mainnet::Client as GenesisClient;
use ethereum_consensus::primitives::BlsPublicKey;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("beacon api error: {0}")]
    Api(#[from] beacon_api_client::Error),
    #[error("beacon node request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected beacon response shape: {0}")]
    BadResponse(String),
}

#[derive(Debug, Deserialize)]
struct SpecResponse {
    data: SpecData,
}

#[derive(Debug, Deserialize)]
struct SpecData {
    #[serde(rename = "SECONDS_PER_SLOT")]
    seconds_per_slot: String,
}

#[derive(Debug, Deserialize)]
struct FinalityCheckpointsResponse {
    data: FinalityCheckpointsData,
}

#[derive(Debug, Deserialize)]
struct FinalityCheckpointsData {
    finalized: Checkpoint,
    current_justified: Checkpoint,
}

#[derive(Debug, Deserialize)]
struct Checkpoint {
    root: String,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    data: BlockData,
}

#[derive(Debug, Deserialize)]
struct BlockData {
    message: BlockMessage,
}

#[derive(Debug, Deserialize)]
struct BlockMessage {
    body: BlockBody,
}

#[derive(Debug, Deserialize)]
struct BlockBody {
    execution_payload: ExecutionPayloadHashOnly,
}

#[derive(Debug, Deserialize)]
struct ExecutionPayloadHashOnly {
    block_hash: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorResponse {
    data: ValidatorEntry,
}

#[derive(Debug, Deserialize)]
struct ValidatorEntry {
    validator: ValidatorDetail,
}

#[derive(Debug, Deserialize)]
struct ValidatorDetail {
    pubkey: BlsPublicKey,
}

fn parse_hash(s: &str) -> Result<B256, Error> {
    s.parse().map_err(|_| Error::BadResponse(format!("bad hash {s}")))
}

/// Genesis + per-build finality lookups against the beacon node's REST API.
#[derive(Clone)]
pub struct BeaconClient {
    http: reqwest::Client,
    base_url: String,
    genesis: GenesisClient,
}

impl BeaconClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, url::ParseError> {
        let base_url = base_url.into();
        Ok(Self {
            http: reqwest::Client::new(),
            genesis: GenesisClient::new(Url::parse(&base_url)?),
            base_url,
        })
    }

    /// `spec.md` §4.G startup step: "fetch chain spec and genesis from beacon client".
    pub async fn genesis_time(&self) -> Result<u64, Error> {
        let genesis = self.genesis.get_genesis_details().await?;
        Ok(genesis.genesis_time)
    }

    /// `GET /eth/v1/config/spec`, reduced to `SECONDS_PER_SLOT`. `spec.md` §4.G startup
    /// step: "fetch chain spec and genesis from beacon client" -- the slot clock must not
    /// assume mainnet's 12s slot time on other networks.
    pub async fn seconds_per_slot(&self) -> Result<u64, Error> {
        let url = format!("{}/eth/v1/config/spec", self.base_url);
        let spec: SpecResponse = self.http.get(&url).send().await?.json().await?;
        spec.data
            .seconds_per_slot
            .parse()
            .map_err(|_| Error::BadResponse(format!("bad SECONDS_PER_SLOT {}", spec.data.seconds_per_slot)))
    }

    /// `GET /eth/v1/beacon/states/head/finality_checkpoints` plus a block lookup for each
    /// checkpoint root, assembled into `spec.md` §3 "FinalityInfo".
    pub async fn finality_info(&self, head_execution_block_hash: B256) -> Result<FinalityInfo, Error> {
        let url = format!("{}/eth/v1/beacon/states/head/finality_checkpoints", self.base_url);
        let checkpoints: FinalityCheckpointsResponse = self.http.get(&url).send().await?.json().await?;

        let safe = self.execution_hash_for_block(&checkpoints.data.current_justified.root).await?;
        let finalized = self.execution_hash_for_block(&checkpoints.data.finalized.root).await?;

        Ok(FinalityInfo {
            head_execution_block_hash,
            safe_execution_block_hash: safe,
            finalized_execution_block_hash: finalized,
        })
    }

    /// `GET /eth/v1/beacon/blocks/<id>`, reduced to its execution-payload block hash.
    async fn execution_hash_for_block(&self, block_root: &str) -> Result<B256, Error> {
        let url = format!("{}/eth/v1/beacon/blocks/{block_root}", self.base_url);
        let block: BlockResponse = self.http.get(&url).send().await?.json().await?;
        parse_hash(&block.data.message.body.execution_payload.block_hash)
    }

    /// `GET /eth/v1/beacon/states/head/validators/<index>`, reduced to the validator's BLS
    /// pubkey -- resolves a `PayloadAttributesEvent.proposer_index` to the key a relay's
    /// registered-validators listing indexes by (`spec.md` §4.H "relay registration for the
    /// slot's proposer").
    pub async fn validator_pubkey(&self, validator_index: u64) -> Result<BlsPublicKey, Error> {
        let url = format!("{}/eth/v1/beacon/states/head/validators/{validator_index}", self.base_url);
        let response: ValidatorResponse = self.http.get(&url).send().await?.json().await?;
        Ok(response.data.validator.pubkey)
    }
}
