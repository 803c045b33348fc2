use thiserror::Error;

/// Crate-level error, composed from each component's own error type the way
/// `mev-build-rs::error::Error` composes `ConsensusError`/`PayloadBuilderError`/`WalletError`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    EventStream(#[from] crate::event_stream::Error),
    #[error(transparent)]
    Beacon(#[from] crate::beacon_client::Error),
    #[error(transparent)]
    Engine(#[from] crate::engine::Error),
    #[error(transparent)]
    Header(#[from] crate::header::Error),
    #[error(transparent)]
    Builder(#[from] crate::builder::Error),
    #[error(transparent)]
    Relay(#[from] crate::relay::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// `spec.md` §7 "Config" kind: invalid fee recipient, bad scheduling mode,
/// malformed payment-mode parse error. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid fee recipient: {0}")]
    InvalidFeeRecipient(String),
    #[error("invalid scheduling mode: {0}")]
    InvalidSchedulingMode(String),
    #[error("invalid relay url {0}: {1}")]
    InvalidRelayUrl(String, url::ParseError),
    #[error("missing or invalid builder_signing_key: {0}")]
    InvalidSigningKey(String),
}
