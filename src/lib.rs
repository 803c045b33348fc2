//! A standalone Ethereum block-builder control plane: consumes a beacon node's SSE event
//! stream, drives an Engine-API-compatible execution client through the build lifecycle,
//! and optionally submits signed bids to MEV-Boost relays.

pub mod beacon_client;
pub mod builder;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event_stream;
pub mod header;
pub mod relay;
pub mod scheduler;
pub mod service;
pub mod stats;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, Error};
pub use service::BuilderService;
