//! Swap settlement.
//!
//! Turns one `SwapIntent` into a realized swap: amount conversion, quote,
//! execution, confirmation, fee collection, ledger entry and volume/tier
//! bookkeeping. In dry-run mode the provider is never contacted.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::amount::{from_raw_amount, lamports_to_sol, to_raw_amount};
use crate::chain::{ChainClient, SwapProvider};
use crate::engine::decimals::MintDecimalsCache;
use crate::fees::tier::tier_for_volume;
use crate::fees::FeeEngine;
use crate::storage::{AccountStore, LedgerWriter};
use crate::types::{
    Account, ExecuteOptions, SwapError, SwapIntent, SwapResult, TxLogEntry, NATIVE_MINT,
};
use crate::wallet::SigningKey;

pub struct SwapSettlement {
    provider: Arc<dyn SwapProvider>,
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerWriter>,
    fees: Arc<FeeEngine>,
    decimals: Arc<MintDecimalsCache>,
    dry_run: bool,
    slippage_bps: u16,
}

impl SwapSettlement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn SwapProvider>,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerWriter>,
        fees: Arc<FeeEngine>,
        decimals: Arc<MintDecimalsCache>,
        dry_run: bool,
        slippage_bps: u16,
    ) -> Self {
        Self {
            provider,
            chain,
            store,
            ledger,
            fees,
            decimals,
            dry_run,
            slippage_bps,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerWriter> {
        &self.ledger
    }

    /// Settle one swap for `wallet` on behalf of `account`.
    pub async fn settle(
        &self,
        account: &Account,
        wallet: &dyn SigningKey,
        intent: &SwapIntent,
    ) -> Result<SwapResult, SwapError> {
        if intent.amount <= Decimal::ZERO {
            return Err(SwapError::Unrecoverable(format!(
                "non-positive swap amount {}",
                intent.amount
            )));
        }

        let input_decimals = self.decimals_for(&intent.input_mint).await?;
        let output_decimals = self.decimals_for(&intent.output_mint).await?;

        let raw = to_raw_amount(intent.amount, input_decimals)
            .map_err(|e| SwapError::Unrecoverable(e.to_string()))?;

        let result = if self.dry_run {
            let result = dry_run_result(&account.id, intent, raw);
            info!(
                account_id = %account.id,
                wallet = %intent.wallet,
                mode = %intent.mode,
                action = %intent.action,
                amount = %intent.amount,
                tx_id = %result.tx_id,
                "[DRY RUN] Swap simulated"
            );
            result
        } else {
            self.settle_live(account, wallet, intent, raw, input_decimals, output_decimals)
                .await?
        };

        self.ledger
            .append(TxLogEntry::settled(&account.id, intent, &result))
            .await;
        self.record_volume(account, result.volume_sol).await;

        Ok(result)
    }

    async fn settle_live(
        &self,
        account: &Account,
        wallet: &dyn SigningKey,
        intent: &SwapIntent,
        raw: u64,
        input_decimals: u8,
        output_decimals: u8,
    ) -> Result<SwapResult, SwapError> {
        let quote = self
            .provider
            .quote(&intent.input_mint, &intent.output_mint, raw, self.slippage_bps)
            .await?;

        let options = ExecuteOptions {
            priority_fee_lamports: account.trading.priority_fee_lamports,
            rpc_url: account.trading.custom_rpc.clone(),
        };
        let executed = self.provider.execute(&quote, wallet, &options).await?;
        self.chain.confirm(&executed.tx_id).await?;

        let volume_lamports = native_side(intent, quote.in_amount, quote.out_amount);

        let fee_tx_id = if volume_lamports > 0 {
            match self.fees.collect(account, wallet, volume_lamports).await {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(
                        account_id = %account.id,
                        wallet = %intent.wallet,
                        swap_tx = %executed.tx_id,
                        error = %e,
                        "Fee collection failed"
                    );
                    None
                }
            }
        } else {
            None
        };

        info!(
            account_id = %account.id,
            wallet = %intent.wallet,
            mode = %intent.mode,
            action = %intent.action,
            in_raw = quote.in_amount,
            out_raw = quote.out_amount,
            tx_id = %executed.tx_id,
            "Swap confirmed"
        );

        Ok(SwapResult {
            tx_id: executed.tx_id,
            input_raw: quote.in_amount,
            output_raw: quote.out_amount,
            input_amount: from_raw_amount(quote.in_amount, input_decimals),
            output_amount: from_raw_amount(quote.out_amount, output_decimals),
            volume_sol: lamports_to_sol(volume_lamports),
            fee_tx_id,
            dry_run: false,
        })
    }

    async fn decimals_for(&self, mint: &str) -> Result<u8, SwapError> {
        self.decimals
            .get(self.chain.as_ref(), mint)
            .await
            .map_err(|e| SwapError::Transient(format!("decimals lookup for {mint}: {e}")))
    }

    /// Add realized volume and move the account to its new tier if it changed.
    async fn record_volume(&self, account: &Account, volume_sol: Decimal) {
        if volume_sol <= Decimal::ZERO {
            return;
        }
        match self.store.add_volume(&account.id, volume_sol).await {
            Ok(total) => {
                let tier = tier_for_volume(total);
                if tier != account.tier {
                    if let Err(e) = self.store.set_tier(&account.id, tier).await {
                        warn!(account_id = %account.id, %tier, error = %e, "Failed to update tier");
                    } else {
                        info!(account_id = %account.id, from = %account.tier, to = %tier, volume = %total, "Tier changed");
                    }
                }
            }
            Err(e) => {
                warn!(account_id = %account.id, volume = %volume_sol, error = %e, "Failed to record volume");
            }
        }
    }
}

/// Raw lamports on the native side of a swap, zero if neither side is native.
fn native_side(intent: &SwapIntent, in_raw: u64, out_raw: u64) -> u64 {
    if intent.input_mint == NATIVE_MINT {
        in_raw
    } else if intent.output_mint == NATIVE_MINT {
        out_raw
    } else {
        0
    }
}

/// Simulated settlement. Without a quote there is no price, so only the
/// input side is known: buys count their SOL input, sells count nothing.
fn dry_run_result(account_id: &str, intent: &SwapIntent, raw: u64) -> SwapResult {
    let wallet_prefix: String = intent.wallet.chars().take(8).collect();
    let tx_id = format!("dryrun_{account_id}_{}_{wallet_prefix}_{raw}", intent.action);
    let volume_lamports = native_side(intent, raw, 0);
    SwapResult {
        tx_id,
        input_raw: raw,
        output_raw: 0,
        input_amount: intent.amount,
        output_amount: Decimal::ZERO,
        volume_sol: lamports_to_sol(volume_lamports),
        fee_tx_id: None,
        dry_run: true,
    }
}
