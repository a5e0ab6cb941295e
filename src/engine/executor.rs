//! Swap executor.
//!
//! Wraps settlement with the retry policy: bounded attempts, a shared
//! rate-limit backoff window per controller, immediate abort on
//! unrecoverable errors and short exponential backoff on transient ones.
//! Never returns an error: a failed intent is `None`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::controller::{ActionSnapshot, Controller};
use crate::engine::settlement::SwapSettlement;
use crate::engine::sleep_unless_stopped;
use crate::types::{Account, SwapError, SwapIntent, SwapResult, TxLogEntry};
use crate::wallet::SigningKey;

/// Consecutive rate-limit hits after which the operator is told to act.
pub const OPERATOR_HINT_HITS: u32 = 3;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after a rate-limit response, on top of the backoff window.
    pub rate_limit_pause: Duration,
    /// First transient backoff; doubles per attempt.
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_pause: Duration::from_secs(1),
            transient_backoff: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the `attempt`-th (1-based) transient failure.
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        self.transient_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

pub struct SwapExecutor {
    settlement: Arc<SwapSettlement>,
    policy: RetryPolicy,
}

impl SwapExecutor {
    pub fn new(settlement: Arc<SwapSettlement>, policy: RetryPolicy) -> Self {
        Self { settlement, policy }
    }

    /// Run `intent` to completion or give up. Returns `None` on failure or stop.
    pub async fn execute(
        &self,
        controller: &Controller,
        account: &Account,
        wallet: &dyn SigningKey,
        intent: &SwapIntent,
    ) -> Option<SwapResult> {
        for attempt in 1..=self.policy.max_attempts {
            if controller.is_stopping() {
                debug!(account_id = %account.id, "Stop requested, dropping swap intent");
                return None;
            }
            if !self.wait_out_backoff(controller).await {
                return None;
            }

            let err = match self.settlement.settle(account, wallet, intent).await {
                Ok(result) => {
                    controller.reset_rate_limit();
                    controller.record_action(snapshot(intent, Some(result.tx_id.clone()), true));
                    return Some(result);
                }
                Err(err) => err,
            };

            controller.record_action(snapshot(intent, None, false));
            controller.record_error(format!("{} {} failed: {err}", intent.mode, intent.action));
            self.settlement
                .ledger()
                .append(TxLogEntry::failed(&account.id, intent, &err))
                .await;

            match &err {
                SwapError::RateLimited(_) => {
                    let (hits, backoff) = controller.rate_limit_hit();
                    warn!(
                        account_id = %account.id,
                        wallet = %intent.wallet,
                        attempt,
                        hits,
                        backoff_secs = backoff.as_secs(),
                        "Rate limited"
                    );
                    if hits == OPERATOR_HINT_HITS {
                        controller.record_operator_hint();
                        warn!(
                            account_id = %account.id,
                            "Repeated rate limiting: configure a dedicated RPC endpoint or widen the action delay"
                        );
                    }
                    if !sleep_unless_stopped(controller, self.policy.rate_limit_pause).await {
                        return None;
                    }
                }
                SwapError::Unrecoverable(_) => {
                    warn!(
                        account_id = %account.id,
                        wallet = %intent.wallet,
                        action = %intent.action,
                        error = %err,
                        "Swap failed permanently"
                    );
                    return None;
                }
                SwapError::Transient(_) => {
                    warn!(
                        account_id = %account.id,
                        wallet = %intent.wallet,
                        attempt,
                        error = %err,
                        "Transient swap failure"
                    );
                    if attempt < self.policy.max_attempts
                        && !sleep_unless_stopped(controller, self.policy.transient_delay(attempt)).await
                    {
                        return None;
                    }
                }
            }
        }

        info!(
            account_id = %account.id,
            wallet = %intent.wallet,
            attempts = self.policy.max_attempts,
            "Swap abandoned after retries"
        );
        None
    }

    /// Sleep until the controller's rate-limit window closes. False if stopped meanwhile.
    async fn wait_out_backoff(&self, controller: &Controller) -> bool {
        while let Some(remaining) = controller.backoff_remaining() {
            debug!(account_id = %controller.account_id(), wait_ms = remaining.as_millis() as u64, "Waiting out rate-limit backoff");
            if !sleep_unless_stopped(controller, remaining).await {
                return false;
            }
        }
        !controller.is_stopping()
    }
}

fn snapshot(intent: &SwapIntent, tx_id: Option<String>, succeeded: bool) -> ActionSnapshot {
    ActionSnapshot {
        at: Utc::now(),
        wallet: intent.wallet.clone(),
        mode: intent.mode,
        action: intent.action,
        amount: intent.amount,
        tx_id,
        succeeded,
    }
}
