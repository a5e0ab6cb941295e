//! Pure mode: buy, wait for the tokens to land, sell the whole balance.

use async_trait::async_trait;
use tracing::debug;

use super::{CycleContext, CycleOutcome, CycleStrategy, PROBE_BUY_SOL};

pub struct PureMode;

#[async_trait]
impl CycleStrategy for PureMode {
    async fn run_cycle(&mut self, ctx: &mut CycleContext<'_>) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        let wallets = ctx.wallets;

        for wallet in wallets {
            if ctx.stopped() {
                break;
            }

            // a fresh controller tests the route with a minimal buy first
            let amount = if ctx.session.first_buy_issued {
                ctx.random_buy_amount()
            } else {
                PROBE_BUY_SOL
            };

            let bought = ctx.buy(wallet.as_ref(), amount).await;
            outcome.record(&bought);
            if ctx.stopped() {
                break;
            }

            if bought.is_some() {
                if !ctx.pause().await {
                    break;
                }
                match ctx.poll_token_balance(wallet.as_ref()).await {
                    Some(balance) => {
                        let sold = ctx.sell(wallet.as_ref(), balance.ui()).await;
                        outcome.record(&sold);
                    }
                    None => debug!(wallet = %wallet.address(), "No token balance to sell"),
                }
            }

            if !ctx.pause().await {
                break;
            }
        }

        outcome
    }
}
