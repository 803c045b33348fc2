//! Builder-to-proposer payment transaction. `spec.md` §4.H step 1, supplemented
//! [PAYMENT_TX] in SPEC_FULL.md.
//!
//! Grounded on `mev_rs::transaction_injector::Injector`: an `ethers` mnemonic-derived
//! `LocalWallet` behind a `SignerMiddleware<Provider<Http>, LocalWallet>`, constructing an
//! `Eip1559TransactionRequest`. Where the teacher alternates senders for its test harness,
//! this always pays from the single configured builder wallet.

use ethers::{
    prelude::*,
    signers::coins_bip39::English,
    types::transaction::eip2718::TypedTransaction,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not derive wallet from mnemonic: {0}")]
    Wallet(#[from] WalletError),
    #[error("could not parse execution JSON-RPC url: {0}")]
    Url(#[from] url::ParseError),
    #[error("could not reach execution JSON-RPC for nonce/fee data: {0}")]
    Provider(#[from] ProviderError),
}

const DEFAULT_GAS: u64 = 21_000;

/// Builds payment transactions from the builder's configured wallet. The nonce is
/// re-fetched from the execution client immediately before each use and never cached
/// across calls (`spec.md` §9 "Builder payment nonce" design note): a payment only lands
/// if our block is proposed, so speculative increments would desync the view we have of
/// our own account.
pub struct PaymentTxBuilder {
    signer: SignerMiddleware<Provider<Http>, LocalWallet>,
}

impl PaymentTxBuilder {
    pub fn new(mnemonic: &str, chain_id: u64, provider_url: &str) -> Result<Self, Error> {
        let wallet = MnemonicBuilder::<English>::default()
            .phrase(mnemonic)
            .index(0u32)?
            .build()?
            .with_chain_id(chain_id);
        let provider = Provider::<Http>::try_from(provider_url).map_err(Error::Provider)?;
        Ok(Self { signer: SignerMiddleware::new(provider, wallet) })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// `spec.md` §4.H step 1: `to` = proposer fee recipient, `value` = configured amount,
    /// nonce re-synced from chain, gas cap `2*baseFee + tip`, gas = 21000 by default.
    pub async fn build_payment(&self, to: Address, value: U256) -> Result<TypedTransaction, Error> {
        let nonce = self.signer.get_transaction_count(self.signer.address(), None).await?;
        let (max_fee, max_priority_fee) = self.signer.estimate_eip1559_fees(None).await?;

        let mut tx = TypedTransaction::Eip1559(
            Eip1559TransactionRequest::new()
                .from(self.signer.address())
                .to(to)
                .value(value)
                .nonce(nonce)
                .gas(DEFAULT_GAS)
                .max_fee_per_gas(max_fee)
                .max_priority_fee_per_gas(max_priority_fee),
        );
        self.signer.fill_transaction(&mut tx, None).await?;
        Ok(tx)
    }

    pub async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes, Error> {
        let signature = self.signer.signer().sign_transaction(tx).await?;
        Ok(tx.rlp_signed(&signature))
    }
}

/// Computes the payment amount for a bid: either a fixed `subsidy_gwei`, or a percentage
/// of the engine-reported `blockValue` (both configured per relay, `spec.md` §9 "payment
/// -mode").
pub fn compute_payment_value(block_value_wei: U256, bid_percent: Option<f64>, subsidy_gwei: Option<u64>) -> U256 {
    if let Some(percent) = bid_percent {
        let scaled = (block_value_wei.as_u128() as f64) * (percent / 100.0);
        U256::from(scaled as u128)
    } else if let Some(gwei) = subsidy_gwei {
        U256::from(gwei) * U256::from(1_000_000_000u64)
    } else {
        U256::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_mode_scales_block_value() {
        let value = compute_payment_value(U256::from(10u64.pow(18)), Some(10.0), None);
        assert_eq!(value, U256::from(10u64.pow(17)));
    }

    #[test]
    fn subsidy_mode_ignores_block_value() {
        let value = compute_payment_value(U256::from(10u64.pow(18)), None, Some(5));
        assert_eq!(value, U256::from(5_000_000_000u64));
    }

    #[test]
    fn neither_mode_configured_pays_nothing() {
        let value = compute_payment_value(U256::from(10u64.pow(18)), None, None);
        assert_eq!(value, U256::zero());
    }
}
