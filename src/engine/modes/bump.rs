//! Bump mode: buy, wait, then sell everything received.

use async_trait::async_trait;

use super::{CycleContext, CycleOutcome, CycleStrategy};

pub struct BumpMode;

#[async_trait]
impl CycleStrategy for BumpMode {
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
                let sold = ctx.sell(wallet.as_ref(), result.output_amount).await;
                outcome.record(&sold);
            }
            if !ctx.pause().await {
                break;
            }
        }

        outcome
    }
}
