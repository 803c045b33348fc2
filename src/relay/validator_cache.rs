//! Polled relay-registration cache. `spec.md` §4.H: "Constructed only when a relay
//! registration for the slot's proposer exists (tracked in a polled `ValidatorCache`
//! refreshed every `validatorPollSecs`)."
//!
//! Grounded on `mev_rs::validator_registration::validator_summary_provider::ValidatorSummaryProvider`'s
//! shape (a mutex-guarded map refreshed by a `load()` call), adapted to index by relay
//! registration (proposer pubkey -> fee recipient) rather than beacon validator status.

use ethereum_consensus::primitives::{BlsPublicKey, ExecutionAddress};
use parking_lot::RwLock;
use std::{collections::HashMap, time::Duration};

#[derive(Debug, Clone)]
pub struct RelayRegistration {
    pub fee_recipient: ExecutionAddress,
    pub gas_limit: u64,
}

#[derive(Default)]
pub struct ValidatorCache {
    registrations: RwLock<HashMap<BlsPublicKey, RelayRegistration>>,
}

impl ValidatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&self, entries: impl IntoIterator<Item = (BlsPublicKey, RelayRegistration)>) {
        let mut registrations = self.registrations.write();
        registrations.clear();
        registrations.extend(entries);
    }

    pub fn get(&self, public_key: &BlsPublicKey) -> Option<RelayRegistration> {
        self.registrations.read().get(public_key).cloned()
    }

    pub fn is_registered(&self, public_key: &BlsPublicKey) -> bool {
        self.registrations.read().contains_key(public_key)
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs `poll` every `interval`, replacing the cache's contents with its result. Errors
/// are logged and the previous snapshot is kept (stale-but-present beats empty).
pub async fn run_poll_loop<F, Fut>(cache: std::sync::Arc<ValidatorCache>, interval: Duration, poll: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<(BlsPublicKey, RelayRegistration)>, crate::relay::client::Error>>,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match poll().await {
            Ok(entries) => cache.replace_all(entries),
            Err(err) => tracing::warn!(err = %err, "failed to refresh validator registration cache; keeping stale snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey(byte: u8) -> BlsPublicKey {
        BlsPublicKey::try_from([byte; 48].as_ref()).unwrap()
    }

    #[test]
    fn replace_all_overwrites_previous_snapshot() {
        let cache = ValidatorCache::new();
        cache.replace_all([(pubkey(1), RelayRegistration { fee_recipient: ExecutionAddress::default(), gas_limit: 30_000_000 })]);
        assert!(cache.is_registered(&pubkey(1)));
        cache.replace_all([(pubkey(2), RelayRegistration { fee_recipient: ExecutionAddress::default(), gas_limit: 30_000_000 })]);
        assert!(!cache.is_registered(&pubkey(1)));
        assert!(cache.is_registered(&pubkey(2)));
    }
}
