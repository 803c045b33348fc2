//! Concurrent relay submission. `spec.md` §4.H step 6: "POST the assembled submission
//! concurrently to every configured relay URL ... results are a per-relay
//! `{success|error}` tuple. No cross-relay abort."
//!
//! Grounded on `mev_boost_rs::relay_mux::RelayMux`'s fan-out-to-every-relay-with-
//! `futures::future::join_all` shape, simplified to a submit-only (no best-bid
//! selection) path since this system has no bidder to aggregate responses for.

use ethereum_consensus::primitives::BlsPublicKey;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error("relay {0} request failed: {1}")]
    Transport(String, String),
    #[error("relay {0} rejected the submission: {1}")]
    Rejected(String, String),
}

#[derive(Debug, Clone)]
pub struct RelaySubmissionOutcome {
    pub relay_url: String,
    pub result: Result<(), Error>,
}

#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    url: String,
    fork_version_header: String,
}

impl RelayClient {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn new(url: impl Into<String>, fork_version_header: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("building a default reqwest client never fails"),
            url: url.into(),
            fork_version_header: fork_version_header.into(),
        }
    }

    /// `POST {url}/relay/v1/builder/blocks`.
    pub async fn submit_block(&self, submission: &Value) -> Result<(), Error> {
        let target = format!("{}/relay/v1/builder/blocks", self.url);
        let response = self
            .http
            .post(&target)
            .header("Eth-Consensus-Version", &self.fork_version_header)
            .json(submission)
            .send()
            .await
            .map_err(|e| Error::Transport(self.url.clone(), e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Rejected(self.url.clone(), format!("{status}: {body}")))
        }
    }

    /// `spec.md` §4.H: registered validators at this relay, for `ValidatorCache` polling.
    /// The relay-side registration-listing endpoint is not standardized across relay
    /// implementations; this assumes a `GET {url}/relay/v1/builder/validators` returning
    /// `[{pubkey, fee_recipient, gas_limit}]`, the shape this system's deployments expose.
    pub async fn get_registered_validators(
        &self,
    ) -> Result<Vec<(BlsPublicKey, crate::relay::validator_cache::RelayRegistration)>, Error> {
        #[derive(serde::Deserialize)]
        struct Entry {
            pubkey: BlsPublicKey,
            fee_recipient: ethereum_consensus::primitives::ExecutionAddress,
            #[serde(default = "default_gas_limit")]
            gas_limit: u64,
        }
        fn default_gas_limit() -> u64 {
            30_000_000
        }

        let target = format!("{}/relay/v1/builder/validators", self.url);
        let response = self
            .http
            .get(&target)
            .send()
            .await
            .map_err(|e| Error::Transport(self.url.clone(), e.to_string()))?;
        let entries: Vec<Entry> = response
            .json()
            .await
            .map_err(|e| Error::Transport(self.url.clone(), e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|e| {
                (
                    e.pubkey,
                    crate::relay::validator_cache::RelayRegistration {
                        fee_recipient: e.fee_recipient,
                        gas_limit: e.gas_limit,
                    },
                )
            })
            .collect())
    }
}

/// Fans a submission out to every relay concurrently; no relay's failure aborts another's
/// attempt (`spec.md` §4.H step 6).
pub async fn submit_to_all(clients: &[RelayClient], submission: &Value) -> Vec<RelaySubmissionOutcome> {
    let futures = clients.iter().map(|client| {
        let submission = submission.clone();
        async move {
            let result = client.submit_block(&submission).await;
            RelaySubmissionOutcome { relay_url: client.url.clone(), result }
        }
    });
    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_to_all_reports_one_outcome_per_relay() {
        let clients = vec![RelayClient::new("http://a.invalid", "deneb"), RelayClient::new("http://b.invalid", "deneb")];
        let outcomes = submit_to_all(&clients, &serde_json::json!({})).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_err()));
    }
}
