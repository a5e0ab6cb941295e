//! Platform fee and referral engine.
//!
//! Computes what each swap owes and settles it on chain:
//! - `tier` — volume bands and per-tier discount/share tables
//! - `referral` — integer split of one fee across up to four referral levels
//! - `FeeEngine` — walks the referral chain, sends the fee transfer,
//!   credits each referrer

pub mod referral;
pub mod tier;

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::ChainClient;
use crate::config::FeesConfig;
use crate::storage::AccountStore;
use crate::types::{Account, FeeDistribution, Transfer};
use crate::wallet::SigningKey;

use referral::{compute_distribution, Referrer, MAX_REFERRAL_DEPTH};

pub struct FeeEngine {
    store: Arc<dyn AccountStore>,
    chain: Arc<dyn ChainClient>,
    rate_bps: u64,
    platform_wallet: String,
    rewards_pool_wallet: String,
}

impl FeeEngine {
    pub fn new(store: Arc<dyn AccountStore>, chain: Arc<dyn ChainClient>, cfg: &FeesConfig) -> Self {
        Self {
            store,
            chain,
            rate_bps: cfg.rate_bps,
            platform_wallet: cfg.platform_wallet.clone(),
            rewards_pool_wallet: cfg.rewards_pool_wallet.clone(),
        }
    }

    /// Walk up to four referral links from `account`, nearest first.
    ///
    /// Stops at the first link that is unknown, unreadable, points back at
    /// the account itself, or revisits an account already in the chain.
    pub async fn referral_chain(&self, account: &Account) -> Vec<Referrer> {
        let mut chain = Vec::with_capacity(MAX_REFERRAL_DEPTH);
        let mut seen: HashSet<String> = HashSet::from([account.id.clone()]);
        let mut next = account.referrer_id.clone();

        while let Some(id) = next.take() {
            if chain.len() >= MAX_REFERRAL_DEPTH || !seen.insert(id.clone()) {
                break;
            }
            match self.store.load(&id).await {
                Ok(Some(referrer)) => {
                    next = referrer.referrer_id.clone();
                    chain.push(Referrer { id, tier: referrer.tier });
                }
                Ok(None) => {
                    debug!(account_id = %account.id, referrer_id = %id, "Referral chain ends at unknown account");
                }
                Err(e) => {
                    warn!(account_id = %account.id, referrer_id = %id, error = %e, "Referral lookup failed");
                }
            }
        }

        chain
    }

    pub async fn distribution_for(&self, account: &Account, volume_lamports: u64) -> FeeDistribution {
        let chain = self.referral_chain(account).await;
        compute_distribution(volume_lamports, self.rate_bps, account.tier, &chain)
    }

    /// Charge the fee for `volume_lamports` of traded SOL from `payer`.
    ///
    /// Sends one transaction with at most two legs (referral aggregate to the
    /// rewards pool, remainder to the platform), then credits each referrer.
    /// Returns the fee transaction id, or `None` when nothing was owed.
    pub async fn collect(
        &self,
        account: &Account,
        payer: &dyn SigningKey,
        volume_lamports: u64,
    ) -> Result<Option<String>> {
        let dist = self.distribution_for(account, volume_lamports).await;
        if dist.effective_fee == 0 {
            return Ok(None);
        }

        let transfers = fee_transfers(&dist, &self.rewards_pool_wallet, &self.platform_wallet);
        let tx_id = self.chain.send_transfers(payer, &transfers).await?;

        info!(
            account_id = %account.id,
            wallet = %payer.address(),
            effective_fee = dist.effective_fee,
            referral_total = dist.referral_total(),
            platform = dist.platform,
            tx_id = %tx_id,
            "Fee collected"
        );

        for share in &dist.shares {
            if let Err(e) = self.store.credit_rewards(&share.referrer_id, share.lamports).await {
                warn!(
                    referrer_id = %share.referrer_id,
                    level = share.level,
                    lamports = share.lamports,
                    error = %e,
                    "Failed to credit referral reward"
                );
            }
        }

        Ok(Some(tx_id))
    }
}

/// Legs of the fee transaction. Zero-value legs are omitted.
pub fn fee_transfers(dist: &FeeDistribution, rewards_pool: &str, platform: &str) -> Vec<Transfer> {
    let mut transfers = Vec::with_capacity(2);
    let referral_total = dist.referral_total();
    if referral_total > 0 {
        transfers.push(Transfer { to: rewards_pool.to_string(), lamports: referral_total });
    }
    if dist.platform > 0 {
        transfers.push(Transfer { to: platform.to_string(), lamports: dist.platform });
    }
    transfers
}
