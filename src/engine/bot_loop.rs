//! Per-account control loop.
//!
//! Each cycle re-reads the account, validates the mint, resolves wallets,
//! runs the selected mode once, checks for persistent failure, and cools
//! down. The loop owns its mode strategies and session state; everything
//! shared lives on the `Controller`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::amount::sol_to_lamports;
use crate::chain::ChainClient;
use crate::engine::controller::{Controller, Phase};
use crate::engine::executor::SwapExecutor;
use crate::engine::modes::{strategy_for, CycleBounds, CycleContext, CycleStrategy, Session};
use crate::engine::registry::ControllerRegistry;
use crate::engine::sleep_unless_stopped;
use crate::storage::AccountStore;
use crate::types::{EngineError, TradingMode};
use crate::wallet::{KeyVault, SigningKey};

/// Consecutive zero-success cycles before wallet balances are probed.
pub const FAILED_CYCLE_LIMIT: u32 = 3;

/// Wallets sampled by the balance probe.
pub const PROBE_WALLETS: usize = 3;

/// Headroom above the minimum buy a wallet needs to keep trading, SOL.
pub const FEE_BUFFER_SOL: Decimal = dec!(0.01);

#[derive(Debug, Clone)]
pub struct LoopTiming {
    /// Pause before retrying after a config, mint or wallet problem.
    pub error_pause: Duration,
    pub cooldown_min: Duration,
    pub cooldown_max: Duration,
    pub balance_poll_attempts: u32,
    pub balance_poll_interval: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            error_pause: Duration::from_secs(5),
            cooldown_min: Duration::from_secs(5),
            cooldown_max: Duration::from_secs(15),
            balance_poll_attempts: 5,
            balance_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Collaborators shared by every account's loop.
pub struct BotEngine {
    pub store: Arc<dyn AccountStore>,
    pub vault: Arc<dyn KeyVault>,
    pub chain: Arc<dyn ChainClient>,
    pub executor: Arc<SwapExecutor>,
    pub timing: LoopTiming,
}

/// Why a loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Graceful stop via the registry.
    StopRequested,
    /// The registry now maps the account to a newer loop.
    Superseded,
    AccountMissing,
    /// `running` was cleared on the stored account.
    Disabled,
    /// Repeated empty cycles and every sampled wallet is underfunded.
    InsufficientFunds,
    /// The loop panicked.
    Crashed,
}

/// Base58 that decodes to a 32-byte public key.
pub fn validate_mint(mint: &str) -> Result<(), EngineError> {
    let bytes = bs58::decode(mint)
        .into_vec()
        .map_err(|e| EngineError::InvalidMint(format!("{mint}: {e}")))?;
    if bytes.len() != 32 {
        return Err(EngineError::InvalidMint(format!("{mint}: {} bytes", bytes.len())));
    }
    Ok(())
}

pub struct BotLoop {
    engine: Arc<BotEngine>,
    registry: Arc<ControllerRegistry>,
    controller: Arc<Controller>,
    session: Session,
    strategies: HashMap<TradingMode, Box<dyn CycleStrategy>>,
}

impl BotLoop {
    pub fn new(
        engine: Arc<BotEngine>,
        registry: Arc<ControllerRegistry>,
        controller: Arc<Controller>,
    ) -> Self {
        Self {
            engine,
            registry,
            controller,
            session: Session::new(StdRng::from_entropy()),
            strategies: HashMap::new(),
        }
    }

    pub async fn run(mut self) -> ExitReason {
        let id = self.controller.account_id().to_string();
        info!(account_id = %id, generation = self.controller.generation(), "Bot loop started");

        loop {
            if !self.registry.is_current(&self.controller).await {
                info!(account_id = %id, "Loop superseded, exiting");
                return ExitReason::Superseded;
            }

            if self.controller.is_stopping() {
                // a concurrent resume keeps the loop alive
                if self.registry.retire(&self.controller, false).await {
                    return ExitReason::StopRequested;
                }
                continue;
            }

            // -- 1. Fresh config ------------------------------------------------
            self.controller.set_phase(Phase::Loading);
            let account = match self.engine.store.load(&id).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    warn!(account_id = %id, error = %EngineError::AccountNotFound(id.clone()), "Exiting loop");
                    return ExitReason::AccountMissing;
                }
                Err(e) => {
                    warn!(account_id = %id, error = %e, "Failed to load account");
                    self.controller.record_error(format!("load account: {e}"));
                    self.pause_after_error().await;
                    continue;
                }
            };

            // -- 2. External disable ---------------------------------------------
            if !account.running {
                if self.registry.retire_disabled(&self.controller).await {
                    info!(account_id = %id, "Account disabled externally");
                    return ExitReason::Disabled;
                }
                continue;
            }

            // -- 3. Mint ---------------------------------------------------------
            if let Err(e) = validate_mint(&account.trading.token_mint) {
                warn!(account_id = %id, error = %e, "Bad token mint");
                self.controller.record_error(e.to_string());
                self.pause_after_error().await;
                continue;
            }

            // -- 4. Wallets ------------------------------------------------------
            let wallets = match self.engine.vault.resolve_signing_keys(&account).await {
                Ok(wallets) if !wallets.is_empty() => wallets,
                Ok(_) => {
                    let err = EngineError::NoWallets(id.clone());
                    warn!(account_id = %id, "No active wallets");
                    self.controller.record_error(err.to_string());
                    self.pause_after_error().await;
                    continue;
                }
                Err(e) => {
                    warn!(account_id = %id, error = %e, "Failed to resolve wallets");
                    self.controller.record_error(format!("resolve wallets: {e}"));
                    self.pause_after_error().await;
                    continue;
                }
            };

            // -- 5. Bounds + 6. Mode ---------------------------------------------
            let bounds = CycleBounds::from_config(&account.trading);
            let mode = account.trading.mode;
            self.controller.set_phase(Phase::Trading);
            debug!(account_id = %id, %mode, wallets = wallets.len(), "Cycle starting");

            let strategy = self
                .strategies
                .entry(mode)
                .or_insert_with(|| strategy_for(mode));
            let mut ctx = CycleContext {
                controller: &self.controller,
                account: &account,
                wallets: &wallets,
                bounds: bounds.clone(),
                executor: &self.engine.executor,
                chain: self.engine.chain.as_ref(),
                timing: &self.engine.timing,
                session: &mut self.session,
            };
            let outcome = strategy.run_cycle(&mut ctx).await;

            // -- 7. Persistent failure -------------------------------------------
            let failed = self.controller.record_cycle(outcome.successes);
            debug!(account_id = %id, successes = outcome.successes, failed_cycles = failed, "Cycle finished");

            if failed >= FAILED_CYCLE_LIMIT && !self.controller.is_stopping() {
                self.controller.set_phase(Phase::Probing);
                if self.wallets_underfunded(&wallets, &bounds).await {
                    error!(
                        account_id = %id,
                        failed_cycles = failed,
                        "Wallets lack funds to trade, stopping bot"
                    );
                    self.controller
                        .record_error("insufficient funds in sampled wallets");
                    return ExitReason::InsufficientFunds;
                }
                self.controller.reset_failed_cycles();
            }

            // -- 8. Cooldown -----------------------------------------------------
            self.controller.set_phase(Phase::Cooldown);
            let cooldown = self.cooldown();
            sleep_unless_stopped(&self.controller, cooldown).await;
        }
    }

    async fn pause_after_error(&self) {
        self.controller.set_phase(Phase::Paused);
        sleep_unless_stopped(&self.controller, self.engine.timing.error_pause).await;
    }

    fn cooldown(&mut self) -> Duration {
        let lo = self.engine.timing.cooldown_min.as_millis() as u64;
        let hi = (self.engine.timing.cooldown_max.as_millis() as u64).max(lo);
        Duration::from_millis(self.session.rng.gen_range(lo..=hi))
    }

    /// True only when every sampled wallet confirmably holds less than
    /// `min_buy + FEE_BUFFER_SOL`. A failed balance query counts as funded.
    async fn wallets_underfunded(&self, wallets: &[Arc<dyn SigningKey>], bounds: &CycleBounds) -> bool {
        let threshold = match sol_to_lamports(bounds.min_buy + FEE_BUFFER_SOL) {
            Ok(lamports) => lamports,
            Err(_) => return false,
        };

        for wallet in wallets.iter().take(PROBE_WALLETS) {
            match self.engine.chain.native_balance(wallet.address()).await {
                Ok(balance) if balance >= threshold => return false,
                Ok(balance) => {
                    debug!(wallet = %wallet.address(), balance, threshold, "Wallet below trading threshold");
                }
                Err(e) => {
                    warn!(wallet = %wallet.address(), error = %e, "Balance probe failed");
                    return false;
                }
            }
        }
        true
    }
}
