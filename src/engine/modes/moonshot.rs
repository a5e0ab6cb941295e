//! Moonshot mode: buys only.

use async_trait::async_trait;

use super::{CycleContext, CycleOutcome, CycleStrategy};

pub struct MoonshotMode;

#[async_trait]
impl CycleStrategy for MoonshotMode {
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
            if !ctx.pause().await {
                break;
            }
        }

        outcome
    }
}
