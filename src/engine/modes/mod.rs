//! Trading mode strategies.
//!
//! Each `TradingMode` has one `CycleStrategy` that runs a single trading
//! cycle across the account's active wallets. Strategies keep their own
//! state between cycles (human mode's per-wallet tracker) and share the
//! `CycleContext` helpers for issuing intents, pausing and polling balances.

pub mod bump;
pub mod growth;
pub mod human;
pub mod moonshot;
pub mod pure;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::amount::{lamports_to_sol, sol_to_lamports};
use crate::chain::ChainClient;
use crate::engine::bot_loop::LoopTiming;
use crate::engine::controller::Controller;
use crate::engine::executor::SwapExecutor;
use crate::engine::sleep_unless_stopped;
use crate::types::{Account, SwapIntent, SwapResult, TokenAmount, TradingConfig, TradingMode};
use crate::wallet::SigningKey;

/// Smallest buy the engine will issue, SOL.
pub const MIN_BUY_SOL: Decimal = dec!(0.001);

/// Size of the first buy a fresh controller issues in pure mode, SOL.
pub const PROBE_BUY_SOL: Decimal = dec!(0.001);

/// Floor on the configured minimum delay between actions.
pub const MIN_DELAY_MS: u64 = 1_000;

/// Per-cycle buy and delay ranges, clamped to safe values.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleBounds {
    pub min_buy: Decimal,
    pub max_buy: Decimal,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl CycleBounds {
    pub fn from_config(cfg: &TradingConfig) -> Self {
        let min_buy = cfg.min_buy.max(MIN_BUY_SOL);
        let max_buy = cfg.max_buy.max(min_buy);
        let min_delay_ms = cfg.min_delay_ms.max(MIN_DELAY_MS);
        let max_delay_ms = cfg.max_delay_ms.max(min_delay_ms);
        Self {
            min_buy,
            max_buy,
            min_delay: Duration::from_millis(min_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }
}

/// State that lives as long as the controller's loop task.
pub struct Session {
    pub rng: StdRng,
    /// Whether any buy has been issued since the controller was created.
    pub first_buy_issued: bool,
}

impl Session {
    pub fn new(rng: StdRng) -> Self {
        Self { rng, first_buy_issued: false }
    }
}

/// Everything a strategy needs for one cycle.
pub struct CycleContext<'a> {
    pub controller: &'a Controller,
    pub account: &'a Account,
    pub wallets: &'a [Arc<dyn SigningKey>],
    pub bounds: CycleBounds,
    pub executor: &'a SwapExecutor,
    pub chain: &'a dyn ChainClient,
    pub timing: &'a LoopTiming,
    pub session: &'a mut Session,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Swaps that settled this cycle.
    pub successes: u32,
}

impl CycleOutcome {
    pub fn record(&mut self, result: &Option<SwapResult>) {
        if result.is_some() {
            self.successes += 1;
        }
    }
}

#[async_trait]
pub trait CycleStrategy: Send + Sync {
    async fn run_cycle(&mut self, ctx: &mut CycleContext<'_>) -> CycleOutcome;
}

pub fn strategy_for(mode: TradingMode) -> Box<dyn CycleStrategy> {
    match mode {
        TradingMode::Pure => Box::new(pure::PureMode),
        TradingMode::Growth => Box::new(growth::GrowthMode),
        TradingMode::Moonshot => Box::new(moonshot::MoonshotMode),
        TradingMode::Bump => Box::new(bump::BumpMode),
        TradingMode::Human => Box::new(human::HumanMode::default()),
    }
}

impl CycleContext<'_> {
    pub fn mode(&self) -> TradingMode {
        self.account.trading.mode
    }

    pub fn mint(&self) -> &str {
        &self.account.trading.token_mint
    }

    pub fn stopped(&self) -> bool {
        self.controller.is_stopping()
    }

    /// Uniform buy size within the cycle bounds, at lamport granularity.
    pub fn random_buy_amount(&mut self) -> Decimal {
        let lo = sol_to_lamports(self.bounds.min_buy).unwrap_or(0);
        let hi = sol_to_lamports(self.bounds.max_buy).unwrap_or(lo).max(lo);
        lamports_to_sol(self.session.rng.gen_range(lo..=hi))
    }

    /// Sleep a random delay within bounds. False if a stop arrived.
    pub async fn pause(&mut self) -> bool {
        let lo = self.bounds.min_delay.as_millis() as u64;
        let hi = self.bounds.max_delay.as_millis() as u64;
        let delay = Duration::from_millis(self.session.rng.gen_range(lo..=hi.max(lo)));
        sleep_unless_stopped(self.controller, delay).await
    }

    pub async fn buy(&mut self, wallet: &dyn SigningKey, sol: Decimal) -> Option<SwapResult> {
        if self.stopped() {
            return None;
        }
        let intent = SwapIntent::buy(wallet.address(), self.mint(), sol, self.mode());
        self.session.first_buy_issued = true;
        self.executor
            .execute(self.controller, self.account, wallet, &intent)
            .await
    }

    pub async fn sell(&mut self, wallet: &dyn SigningKey, tokens: Decimal) -> Option<SwapResult> {
        if self.stopped() || tokens <= Decimal::ZERO {
            return None;
        }
        let intent = SwapIntent::sell(wallet.address(), self.mint(), tokens, self.mode());
        self.executor
            .execute(self.controller, self.account, wallet, &intent)
            .await
    }

    /// Poll the wallet's token balance until it is non-zero or attempts run out.
    pub async fn poll_token_balance(&self, wallet: &dyn SigningKey) -> Option<TokenAmount> {
        for attempt in 1..=self.timing.balance_poll_attempts {
            if self.stopped() {
                return None;
            }
            match self.chain.token_balance(wallet.address(), self.mint()).await {
                Ok(balance) if !balance.is_zero() => return Some(balance),
                Ok(_) => debug!(wallet = %wallet.address(), attempt, "Token balance not visible yet"),
                Err(e) => debug!(wallet = %wallet.address(), attempt, error = %e, "Token balance query failed"),
            }
            if attempt < self.timing.balance_poll_attempts
                && !sleep_unless_stopped(self.controller, self.timing.balance_poll_interval).await
            {
                return None;
            }
        }
        None
    }
}
