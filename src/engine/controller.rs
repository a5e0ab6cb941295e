//! Per-account runtime controller.
//!
//! Shared between the registry (start/stop/status) and the account's loop
//! task. Holds the cooperative stop flag, the loop's generation number,
//! health snapshots and the rate-limit backoff window.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{AccountId, SwapAction, TradingMode};

/// Upper bound on the rate-limit backoff window.
pub const MAX_RATE_LIMIT_BACKOFF_SECS: u64 = 30;

/// Backoff window after the `hits`-th consecutive rate-limit: 4, 8, 16, 30, 30...
pub fn rate_limit_backoff(hits: u32) -> Duration {
    let secs = 2u64
        .saturating_pow(hits)
        .saturating_mul(2)
        .min(MAX_RATE_LIMIT_BACKOFF_SECS);
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Starting,
    Loading,
    Trading,
    Probing,
    Cooldown,
    /// Waiting to retry after a config, mint or wallet problem.
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionSnapshot {
    pub at: DateTime<Utc>,
    pub wallet: String,
    pub mode: TradingMode,
    pub action: SwapAction,
    pub amount: Decimal,
    pub tx_id: Option<String>,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorSnapshot {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub hits: u32,
    /// Milliseconds left in the current backoff window.
    pub backoff_remaining_ms: u64,
    /// Operator warnings issued over the controller's lifetime.
    pub operator_hints: u32,
}

/// Read-only view returned by `ControllerRegistry::status`.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub account_id: AccountId,
    pub generation: u64,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub last_action: Option<ActionSnapshot>,
    pub last_error: Option<ErrorSnapshot>,
    pub rate_limit: RateLimitStatus,
    pub failed_cycles: u32,
    pub stop_requested_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ControllerState {
    phase: Phase,
    last_heartbeat: DateTime<Utc>,
    last_action: Option<ActionSnapshot>,
    last_error: Option<ErrorSnapshot>,
    rate_limit_hits: u32,
    backoff_until: Option<Instant>,
    operator_hints: u32,
    failed_cycles: u32,
    stop_requested_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Controller {
    account_id: AccountId,
    generation: u64,
    started_at: DateTime<Utc>,
    stop: AtomicBool,
    state: Mutex<ControllerState>,
}

impl Controller {
    pub fn new(account_id: &str, generation: u64) -> Self {
        let now = Utc::now();
        Self {
            account_id: account_id.to_string(),
            generation,
            started_at: now,
            stop: AtomicBool::new(false),
            state: Mutex::new(ControllerState {
                phase: Phase::Starting,
                last_heartbeat: now,
                last_action: None,
                last_error: None,
                rate_limit_hits: 0,
                backoff_until: None,
                operator_hints: 0,
                failed_cycles: 0,
                stop_requested_at: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // -- Stop flag ------------------------------------------------------------

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Set the stop flag. Returns false if it was already set.
    pub fn request_stop(&self) -> bool {
        let newly = !self.stop.swap(true, Ordering::SeqCst);
        if newly {
            let mut st = self.state();
            st.stop_requested_at = Some(Utc::now());
            st.phase = Phase::Stopping;
        }
        newly
    }

    /// Cancel a pending stop so the running loop carries on.
    pub fn resume(&self) {
        self.stop.store(false, Ordering::SeqCst);
        let mut st = self.state();
        st.stop_requested_at = None;
        if st.phase == Phase::Stopping {
            st.phase = Phase::Loading;
        }
    }

    // -- Health ---------------------------------------------------------------

    pub fn set_phase(&self, phase: Phase) {
        let mut st = self.state();
        // a pending stop stays visible until the loop exits or is resumed
        if st.phase != Phase::Stopping || !self.is_stopping() {
            st.phase = phase;
        }
        st.last_heartbeat = Utc::now();
    }

    pub fn heartbeat(&self) {
        self.state().last_heartbeat = Utc::now();
    }

    pub fn record_action(&self, snapshot: ActionSnapshot) {
        let mut st = self.state();
        st.last_heartbeat = snapshot.at;
        st.last_action = Some(snapshot);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let mut st = self.state();
        let now = Utc::now();
        st.last_heartbeat = now;
        st.last_error = Some(ErrorSnapshot { at: now, message: message.into() });
    }

    // -- Rate limiting ----------------------------------------------------------

    /// Register a rate-limit response. Returns the new consecutive hit count
    /// and the backoff window now in force.
    pub fn rate_limit_hit(&self) -> (u32, Duration) {
        let mut st = self.state();
        st.rate_limit_hits = st.rate_limit_hits.saturating_add(1);
        let backoff = rate_limit_backoff(st.rate_limit_hits);
        st.backoff_until = Some(Instant::now() + backoff);
        (st.rate_limit_hits, backoff)
    }

    pub fn reset_rate_limit(&self) {
        let mut st = self.state();
        st.rate_limit_hits = 0;
        st.backoff_until = None;
    }

    pub fn record_operator_hint(&self) {
        let mut st = self.state();
        st.operator_hints = st.operator_hints.saturating_add(1);
    }

    pub fn rate_limit_hits(&self) -> u32 {
        self.state().rate_limit_hits
    }

    /// Time left before the next swap may be attempted.
    pub fn backoff_remaining(&self) -> Option<Duration> {
        let until = self.state().backoff_until?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    // -- Failed cycles ----------------------------------------------------------

    /// Record a finished cycle. Returns the consecutive zero-success count.
    pub fn record_cycle(&self, successes: u32) -> u32 {
        let mut st = self.state();
        if successes > 0 {
            st.failed_cycles = 0;
        } else {
            st.failed_cycles += 1;
        }
        st.failed_cycles
    }

    pub fn reset_failed_cycles(&self) {
        self.state().failed_cycles = 0;
    }

    pub fn status(&self) -> ControllerStatus {
        let st = self.state();
        let backoff_remaining_ms = st
            .backoff_until
            .map(|until| until.saturating_duration_since(Instant::now()).as_millis() as u64)
            .unwrap_or(0);
        ControllerStatus {
            account_id: self.account_id.clone(),
            generation: self.generation,
            phase: st.phase,
            started_at: self.started_at,
            last_heartbeat: st.last_heartbeat,
            last_action: st.last_action.clone(),
            last_error: st.last_error.clone(),
            rate_limit: RateLimitStatus {
                hits: st.rate_limit_hits,
                backoff_remaining_ms,
                operator_hints: st.operator_hints,
            },
            failed_cycles: st.failed_cycles,
            stop_requested_at: st.stop_requested_at,
        }
    }
}
