//! Human mode.
//!
//! Randomized multi-wallet activity meant to look organic. Each wallet runs
//! a small state machine: after two consecutive buys it must sell before it
//! may buy again. Five patterns are drawn at random per cycle:
//!
//! | # | Pattern |
//! |---|---------|
//! | 0 | random subset, each wallet buys then sells |
//! | 1 | weighted random actions (60% buy / 40% sell), then liquidate every holder |
//! | 2 | batch buys over a subset, a long pause, then liquidate every holder |
//! | 3 | several buy/sell rounds on one wallet |
//! | 4 | mixed actions (70% buy / 30% sell), forced sells first |

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use super::{CycleContext, CycleOutcome, CycleStrategy};

/// Buys a wallet may make in a row before it is forced to sell.
pub const MAX_CONSECUTIVE_BUYS: u32 = 2;

/// Upper bound on random steps in patterns 1 and 4.
const MAX_PATTERN_STEPS: usize = 12;

pub const PATTERN_COUNT: u8 = 5;

/// Per-wallet position in the buy/sell cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalletState {
    #[default]
    Idle,
    BoughtOnce { held: Decimal },
    MustSell { held: Decimal },
}

impl WalletState {
    pub fn consecutive_buys(&self) -> u32 {
        match self {
            WalletState::Idle => 0,
            WalletState::BoughtOnce { .. } => 1,
            WalletState::MustSell { .. } => MAX_CONSECUTIVE_BUYS,
        }
    }

    pub fn held(&self) -> Decimal {
        match self {
            WalletState::Idle => Decimal::ZERO,
            WalletState::BoughtOnce { held } | WalletState::MustSell { held } => *held,
        }
    }

    pub fn can_buy(&self) -> bool {
        self.consecutive_buys() < MAX_CONSECUTIVE_BUYS
    }

    pub fn must_sell(&self) -> bool {
        matches!(self, WalletState::MustSell { .. })
    }

    /// State after a successful buy that received `tokens`.
    pub fn after_buy(self, tokens: Decimal) -> Self {
        match self {
            WalletState::Idle => WalletState::BoughtOnce { held: tokens },
            WalletState::BoughtOnce { held } | WalletState::MustSell { held } => {
                WalletState::MustSell { held: held + tokens }
            }
        }
    }
}

/// Wallet states keyed by address. Unknown wallets are idle.
#[derive(Debug, Default)]
pub struct HumanTracker {
    wallets: HashMap<String, WalletState>,
}

impl HumanTracker {
    pub fn state(&self, wallet: &str) -> WalletState {
        self.wallets.get(wallet).copied().unwrap_or_default()
    }

    pub fn on_buy(&mut self, wallet: &str, tokens: Decimal) {
        let next = self.state(wallet).after_buy(tokens);
        self.wallets.insert(wallet.to_string(), next);
    }

    pub fn on_sell(&mut self, wallet: &str) {
        self.wallets.insert(wallet.to_string(), WalletState::Idle);
    }
}

#[derive(Default)]
pub struct HumanMode {
    tracker: HumanTracker,
}

impl HumanMode {
    pub fn tracker(&self) -> &HumanTracker {
        &self.tracker
    }

    fn state(&self, ctx: &CycleContext<'_>, idx: usize) -> WalletState {
        self.tracker.state(ctx.wallets[idx].address())
    }

    /// Buy with wallet `idx` if its state allows it.
    async fn try_buy(&mut self, ctx: &mut CycleContext<'_>, idx: usize, outcome: &mut CycleOutcome) -> bool {
        let wallets = ctx.wallets;
        let wallet = wallets[idx].as_ref();
        if !self.tracker.state(wallet.address()).can_buy() {
            return false;
        }
        let amount = ctx.random_buy_amount();
        match ctx.buy(wallet, amount).await {
            Some(result) => {
                self.tracker.on_buy(wallet.address(), result.output_amount);
                outcome.successes += 1;
                true
            }
            None => false,
        }
    }

    /// Sell everything wallet `idx` holds.
    ///
    /// When the tracked position is empty the on-chain balance is used; a
    /// wallet with nothing to sell is reset to idle.
    async fn try_sell(&mut self, ctx: &mut CycleContext<'_>, idx: usize, outcome: &mut CycleOutcome) -> bool {
        let wallets = ctx.wallets;
        let wallet = wallets[idx].as_ref();
        let state = self.tracker.state(wallet.address());
        if state == WalletState::Idle {
            return false;
        }

        let mut tokens = state.held();
        if tokens <= Decimal::ZERO {
            tokens = match ctx.chain.token_balance(wallet.address(), ctx.mint()).await {
                Ok(balance) => balance.ui(),
                Err(_) => Decimal::ZERO,
            };
        }
        if tokens <= Decimal::ZERO {
            debug!(wallet = %wallet.address(), "Nothing to sell, clearing position");
            self.tracker.on_sell(wallet.address());
            return false;
        }

        match ctx.sell(wallet, tokens).await {
            Some(_) => {
                self.tracker.on_sell(wallet.address());
                outcome.successes += 1;
                true
            }
            None => false,
        }
    }

    /// Random subset of wallet indices, at least one.
    fn subset(ctx: &mut CycleContext<'_>) -> Vec<usize> {
        let n = ctx.wallets.len();
        let k = ctx.session.rng.gen_range(1..=n);
        let mut idx: Vec<usize> = (0..n).collect();
        idx.shuffle(&mut ctx.session.rng);
        idx.truncate(k);
        idx
    }

    fn step_count(ctx: &mut CycleContext<'_>) -> usize {
        let n = ctx.wallets.len();
        let lo = n.clamp(2, MAX_PATTERN_STEPS);
        let hi = (2 * n).clamp(lo, MAX_PATTERN_STEPS);
        ctx.session.rng.gen_range(lo..=hi)
    }

    /// Sell every wallet still holding a position.
    async fn liquidate_all(&mut self, ctx: &mut CycleContext<'_>, outcome: &mut CycleOutcome) {
        for idx in 0..ctx.wallets.len() {
            if ctx.stopped() {
                return;
            }
            if self.state(ctx, idx) != WalletState::Idle {
                self.try_sell(ctx, idx, outcome).await;
            }
        }
    }

    // -- Patterns -------------------------------------------------------------

    async fn sequential(&mut self, ctx: &mut CycleContext<'_>, outcome: &mut CycleOutcome) {
        for idx in Self::subset(ctx) {
            if ctx.stopped() {
                return;
            }
            if self.state(ctx, idx).must_sell() {
                self.try_sell(ctx, idx, outcome).await;
            } else if self.try_buy(ctx, idx, outcome).await {
                if !ctx.pause().await {
                    return;
                }
                self.try_sell(ctx, idx, outcome).await;
            }
            if !ctx.pause().await {
                return;
            }
        }
    }

    async fn weighted(&mut self, ctx: &mut CycleContext<'_>, outcome: &mut CycleOutcome) {
        for _ in 0..Self::step_count(ctx) {
            if ctx.stopped() {
                return;
            }
            let idx = ctx.session.rng.gen_range(0..ctx.wallets.len());
            let state = self.state(ctx, idx);
            let want_buy = ctx.session.rng.gen_bool(0.6);

            if state.must_sell() || (!want_buy && state != WalletState::Idle) || !state.can_buy() {
                self.try_sell(ctx, idx, outcome).await;
            } else {
                self.try_buy(ctx, idx, outcome).await;
            }

            if !ctx.pause().await {
                return;
            }
        }
        self.liquidate_all(ctx, outcome).await;
    }

    async fn batch(&mut self, ctx: &mut CycleContext<'_>, outcome: &mut CycleOutcome) {
        for idx in Self::subset(ctx) {
            if ctx.stopped() {
                return;
            }
            if self.state(ctx, idx).must_sell() {
                self.try_sell(ctx, idx, outcome).await;
            } else {
                self.try_buy(ctx, idx, outcome).await;
            }
            if !ctx.pause().await {
                return;
            }
        }

        // hold for a while before dumping
        if !ctx.pause().await || !ctx.pause().await {
            return;
        }

        self.liquidate_all(ctx, outcome).await;
    }

    async fn rounds(&mut self, ctx: &mut CycleContext<'_>, outcome: &mut CycleOutcome) {
        let idx = ctx.session.rng.gen_range(0..ctx.wallets.len());
        let rounds: u32 = ctx.session.rng.gen_range(2..=4);

        for _ in 0..rounds {
            if ctx.stopped() {
                return;
            }
            if self.state(ctx, idx).must_sell() {
                self.try_sell(ctx, idx, outcome).await;
            } else if self.try_buy(ctx, idx, outcome).await {
                if !ctx.pause().await {
                    return;
                }
                self.try_sell(ctx, idx, outcome).await;
            }
            if !ctx.pause().await {
                return;
            }
        }
    }

    async fn mixed(&mut self, ctx: &mut CycleContext<'_>, outcome: &mut CycleOutcome) {
        for _ in 0..Self::step_count(ctx) {
            if ctx.stopped() {
                return;
            }

            let wallets = ctx.wallets;
            let forced: Vec<usize> = (0..wallets.len())
                .filter(|&i| self.tracker.state(wallets[i].address()).must_sell())
                .collect();

            if let Some(&idx) = forced.choose(&mut ctx.session.rng) {
                self.try_sell(ctx, idx, outcome).await;
            } else {
                let idx = ctx.session.rng.gen_range(0..ctx.wallets.len());
                let state = self.state(ctx, idx);
                let want_buy = ctx.session.rng.gen_bool(0.7);
                if (want_buy && state.can_buy()) || state == WalletState::Idle {
                    self.try_buy(ctx, idx, outcome).await;
                } else {
                    self.try_sell(ctx, idx, outcome).await;
                }
            }

            if !ctx.pause().await {
                return;
            }
        }
    }

    pub async fn run_pattern(&mut self, pattern: u8, ctx: &mut CycleContext<'_>) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        if ctx.wallets.is_empty() {
            return outcome;
        }
        debug!(account_id = %ctx.account.id, pattern, "Human pattern");
        match pattern {
            0 => self.sequential(ctx, &mut outcome).await,
            1 => self.weighted(ctx, &mut outcome).await,
            2 => self.batch(ctx, &mut outcome).await,
            3 => self.rounds(ctx, &mut outcome).await,
            _ => self.mixed(ctx, &mut outcome).await,
        }
        outcome
    }
}

#[async_trait]
impl CycleStrategy for HumanMode {
    async fn run_cycle(&mut self, ctx: &mut CycleContext<'_>) -> CycleOutcome {
        let pattern = ctx.session.rng.gen_range(0..PATTERN_COUNT);
        self.run_pattern(pattern, ctx).await
    }
}
