//! Growth mode: sell back 90% of each buy so a position accumulates slowly.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{CycleContext, CycleOutcome, CycleStrategy};

/// Fraction of each buy's output sold straight back.
pub const GROWTH_SELL_FRACTION: Decimal = dec!(0.9);

pub struct GrowthMode;

#[async_trait]
impl CycleStrategy for GrowthMode {
    async fn run_cycle(&mut self, ctx: &mut CycleContext<'_>) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        let wallets = ctx.wallets;

        for wallet in wallets {
            if ctx.stopped() {
                break;
            }
            let amount = ctx.random_buy_amount();
            let bought = ctx.buy(wallet.as_ref(), amount).await;
            outcome.record(&bought);
            if ctx.stopped() {
                break;
            }

            if let Some(result) = bought {
                if !ctx.pause().await {
                    break;
                }
                let tokens = result.output_amount * GROWTH_SELL_FRACTION;
                let sold = ctx.sell(wallet.as_ref(), tokens).await;
                outcome.record(&sold);
            }

            if !ctx.pause().await {
                break;
            }
        }

        outcome
    }
}
