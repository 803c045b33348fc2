use crate::error::ConfigError;
use ethereum_consensus::{crypto::SecretKey, primitives::ExecutionAddress, state_transition::Context};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, time::Duration};

/// Which network's fork-version/genesis-validators-root constants to use when computing
/// the builder-application BLS signing domain. Mirrors `mev_rs::network::Network` /
/// `mev_boost_rs::service::Service`'s `let context: Context = self.network.into()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Sepolia,
    Goerli,
    Holesky,
}

impl Network {
    pub fn context(&self) -> Context {
        match self {
            Self::Mainnet => Context::for_mainnet(),
            Self::Sepolia => Context::for_sepolia(),
            Self::Goerli => Context::for_goerli(),
            Self::Holesky => Context::for_holesky(),
        }
    }
}

/// `spec.md` §3 "Schedule": governs the admission predicate in the slot scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    All,
    EveryNth,
    NextN,
}

impl FromStr for SchedulingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "every_nth" | "every-nth" => Ok(Self::EveryNth),
            "next_n" | "next-n" => Ok(Self::NextN),
            other => Err(ConfigError::InvalidSchedulingMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub mode: SchedulingMode,
    #[serde(default)]
    pub every_nth: u64,
    #[serde(default)]
    pub next_n: u64,
    #[serde(default)]
    pub start_slot: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { mode: SchedulingMode::All, every_nth: 0, next_n: 0, start_slot: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub url: String,
    #[serde(default)]
    pub bid_percent: Option<f64>,
    #[serde(default)]
    pub subsidy_gwei: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `GET {beacon_api_endpoint}/eth/v1/events?topics=...` and beacon REST endpoints.
    pub beacon_api_endpoint: String,
    /// `engine_forkchoiceUpdatedV{N}` / `engine_getPayloadV{N}` endpoint.
    pub engine_api_endpoint: String,
    /// path to the shared secret used to mint HS256 JWT bearer tokens for the engine.
    pub jwt_secret_path: String,

    pub fee_recipient: String,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// sub-slot offset, in milliseconds, at which to start a build. Negative means
    /// "before slot start" (the usual case).
    #[serde(default = "default_build_start_time_ms")]
    pub build_start_time_ms: i64,
    /// optional delay between `forkchoiceUpdated` and `getPayload`, to let the
    /// engine pack more transactions. See `spec.md` §4.C edge-case policy.
    #[serde(default)]
    pub payload_build_time_ms: u64,
    #[serde(default = "default_build_deadline_ms")]
    pub build_deadline_ms: u64,

    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    #[serde(default)]
    pub relays: Vec<RelayConfig>,
    #[serde(default = "default_validator_poll_secs")]
    pub validator_poll_secs: u64,
    /// network whose fork-version/genesis-validators-root constants feed the BidTrace
    /// signing domain (`spec.md` §4.H step 4).
    #[serde(default)]
    pub network: Network,
    /// hex-encoded 32-byte BLS secret key the builder signs BidTrace submissions with.
    /// Required only when `relays` is non-empty.
    #[serde(default)]
    pub builder_signing_key: Option<String>,
    /// `Eth-Consensus-Version` header value sent with relay bid submissions.
    #[serde(default = "default_consensus_version")]
    pub consensus_version: String,

    /// mnemonic (optionally `phrase:index`) for the builder's execution-layer wallet,
    /// used only by the relay bid path's payment-transaction injector.
    #[serde(default)]
    pub execution_mnemonic: Option<String>,
    #[serde(default)]
    pub execution_chain_id: u64,
}

fn default_build_start_time_ms() -> i64 {
    -3_000
}

fn default_build_deadline_ms() -> u64 {
    10_000
}

fn default_cache_size() -> usize {
    64
}

fn default_validator_poll_secs() -> u64 {
    30
}

fn default_consensus_version() -> String {
    "deneb".to_string()
}

impl Config {
    pub fn from_toml_file<P: AsRef<Path> + fmt::Display>(path: P) -> Result<Self, ConfigError> {
        tracing::info!("loading config from `{path}`...");
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|source| ConfigError::Read { path: path.to_string(), source })?;
        let config: Self = toml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn fee_recipient(&self) -> Result<ExecutionAddress, ConfigError> {
        ExecutionAddress::try_from(self.fee_recipient.as_ref())
            .map_err(|_| ConfigError::InvalidFeeRecipient(self.fee_recipient.clone()))
    }

    pub fn build_start_time(&self) -> Duration {
        Duration::from_millis(self.build_start_time_ms.unsigned_abs())
    }

    pub fn build_deadline(&self) -> Duration {
        Duration::from_millis(self.build_deadline_ms)
    }

    pub fn context(&self) -> Context {
        self.network.context()
    }

    /// Decodes `builder_signing_key` into a BLS secret key. Required whenever `relays` is
    /// non-empty, since every relay submission is signed with it (`spec.md` §4.H step 4).
    pub fn builder_signing_key(&self) -> Result<SecretKey, ConfigError> {
        let hex_key = self
            .builder_signing_key
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidSigningKey("not configured".to_string()))?;
        let bytes = hex::decode(hex_key.trim_start_matches("0x"))
            .map_err(|e| ConfigError::InvalidSigningKey(e.to_string()))?;
        SecretKey::try_from(bytes.as_slice())
            .map_err(|_| ConfigError::InvalidSigningKey(format!("{} bytes is not a valid BLS secret key", bytes.len())))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.fee_recipient()?;
        for relay in &self.relays {
            url::Url::parse(&relay.url).map_err(|e| ConfigError::InvalidRelayUrl(relay.url.clone(), e))?;
        }
        if !self.relays.is_empty() {
            self.builder_signing_key()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            beacon_api_endpoint = "http://localhost:5052"
            engine_api_endpoint = "http://localhost:8551"
            jwt_secret_path = "/tmp/jwt.hex"
            fee_recipient = "0x000000000000000000000000000000000000aa"

            [schedule]
            mode = "every_nth"
            every_nth = 4
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.schedule.mode, SchedulingMode::EveryNth);
        assert_eq!(config.schedule.every_nth, 4);
        assert_eq!(config.build_start_time_ms, -3_000);
        assert!(config.fee_recipient().is_ok());
        assert_eq!(config.network, Network::Mainnet);
        assert!(config.relays.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relay_without_signing_key_fails_validation() {
        let toml = r#"
            beacon_api_endpoint = "http://localhost:5052"
            engine_api_endpoint = "http://localhost:8551"
            jwt_secret_path = "/tmp/jwt.hex"
            fee_recipient = "0x000000000000000000000000000000000000aa"

            [[relays]]
            url = "https://relay.example"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn relay_with_signing_key_passes_validation() {
        let toml = r#"
            beacon_api_endpoint = "http://localhost:5052"
            engine_api_endpoint = "http://localhost:8551"
            jwt_secret_path = "/tmp/jwt.hex"
            fee_recipient = "0x000000000000000000000000000000000000aa"
            builder_signing_key = "1111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111"

            [[relays]]
            url = "https://relay.example"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_fee_recipient() {
        let toml = r#"
            beacon_api_endpoint = "http://localhost:5052"
            engine_api_endpoint = "http://localhost:8551"
            jwt_secret_path = "/tmp/jwt.hex"
            fee_recipient = "not-an-address"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
