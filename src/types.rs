//! Shared types for the volume engine.
//!
//! These types form the data model used across all modules: accounts and
//! their trading configuration, swap intents and results, the audit ledger
//! entry, fee distributions, and the error taxonomy that drives retries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::from_raw_amount;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Wrapped-SOL mint, used as the native side of every swap.
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Decimals of the native asset.
pub const NATIVE_DECIMALS: u8 = 9;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub type AccountId = String;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Trading strategy selected for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Buy then sell the full token balance.
    Pure,
    /// Buy then sell 90% of what was received.
    Growth,
    /// Buy only.
    Moonshot,
    /// Buy, wait, then sell everything received.
    Bump,
    /// Randomized multi-wallet patterns with a consecutive-buy bound.
    Human,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Pure => write!(f, "pure"),
            TradingMode::Growth => write!(f, "growth"),
            TradingMode::Moonshot => write!(f, "moonshot"),
            TradingMode::Bump => write!(f, "bump"),
            TradingMode::Human => write!(f, "human"),
        }
    }
}

/// Volume tier. Ordering follows the volume bands, lowest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Unranked,
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Unranked => write!(f, "unranked"),
            Tier::Bronze => write!(f, "bronze"),
            Tier::Silver => write!(f, "silver"),
            Tier::Gold => write!(f, "gold"),
            Tier::Diamond => write!(f, "diamond"),
        }
    }
}

/// Per-account trading parameters. Re-read at the start of every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub token_mint: String,
    /// Minimum buy size in SOL.
    pub min_buy: Decimal,
    /// Maximum buy size in SOL.
    pub max_buy: Decimal,
    /// Minimum pause between actions, milliseconds.
    pub min_delay_ms: u64,
    /// Maximum pause between actions, milliseconds.
    pub max_delay_ms: u64,
    pub mode: TradingMode,
    /// Wallet addresses to trade with. Empty means every wallet the vault holds.
    #[serde(default)]
    pub active_wallets: Vec<String>,
    #[serde(default)]
    pub custom_rpc: Option<String>,
    #[serde(default)]
    pub priority_fee_lamports: Option<u64>,
}

/// A user account owning a set of sub-wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub running: bool,
    #[serde(default)]
    pub tier: Tier,
    /// Cumulative traded volume in SOL.
    #[serde(default)]
    pub cumulative_volume: Decimal,
    #[serde(default)]
    pub referrer_id: Option<AccountId>,
    /// Referral rewards credited to this account, lamports.
    #[serde(default)]
    pub earned_rewards_lamports: u64,
    pub trading: TradingConfig,
}

// ---------------------------------------------------------------------------
// Swaps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapAction {
    Buy,
    Sell,
}

impl fmt::Display for SwapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapAction::Buy => write!(f, "buy"),
            SwapAction::Sell => write!(f, "sell"),
        }
    }
}

/// A request to perform one swap for one wallet.
#[derive(Debug, Clone, Serialize)]
pub struct SwapIntent {
    pub wallet: String,
    pub input_mint: String,
    pub output_mint: String,
    /// Requested input amount in UI units of `input_mint`.
    pub amount: Decimal,
    pub mode: TradingMode,
    pub action: SwapAction,
}

impl SwapIntent {
    /// Spend `sol` SOL on `token_mint`.
    pub fn buy(wallet: &str, token_mint: &str, sol: Decimal, mode: TradingMode) -> Self {
        Self {
            wallet: wallet.to_string(),
            input_mint: NATIVE_MINT.to_string(),
            output_mint: token_mint.to_string(),
            amount: sol,
            mode,
            action: SwapAction::Buy,
        }
    }

    /// Sell `tokens` UI units of `token_mint` back to SOL.
    pub fn sell(wallet: &str, token_mint: &str, tokens: Decimal, mode: TradingMode) -> Self {
        Self {
            wallet: wallet.to_string(),
            input_mint: token_mint.to_string(),
            output_mint: NATIVE_MINT.to_string(),
            amount: tokens,
            mode,
            action: SwapAction::Sell,
        }
    }
}

/// Realized outcome of a settled swap.
#[derive(Debug, Clone, Serialize)]
pub struct SwapResult {
    pub tx_id: String,
    pub input_raw: u64,
    pub output_raw: u64,
    pub input_amount: Decimal,
    pub output_amount: Decimal,
    /// SOL volume counted toward the account's cumulative total.
    pub volume_sol: Decimal,
    pub fee_tx_id: Option<String>,
    pub dry_run: bool,
}

/// Raw token balance together with its decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn ui(&self) -> Decimal {
        from_raw_amount(self.raw, self.decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }
}

/// Quote returned by the swap provider. `route` is passed back verbatim on execution.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub slippage_bps: u16,
    pub route: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub priority_fee_lamports: Option<u64>,
    /// Submit through this RPC endpoint instead of the default.
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutedSwap {
    pub tx_id: String,
}

/// One leg of a native transfer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub to: String,
    pub lamports: u64,
}

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// A single referrer's cut of a fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralShare {
    pub referrer_id: AccountId,
    pub level: u8,
    pub tier: Tier,
    pub lamports: u64,
}

/// How one swap's fee splits between referrers and the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeDistribution {
    pub base_fee: u64,
    pub effective_fee: u64,
    pub shares: Vec<ReferralShare>,
    pub platform: u64,
}

impl FeeDistribution {
    pub fn referral_total(&self) -> u64 {
        self.shares.iter().map(|s| s.lamports).sum()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Confirmed,
    Failed,
    #[serde(rename = "dryrun")]
    DryRun,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Confirmed => write!(f, "confirmed"),
            TxStatus::Failed => write!(f, "failed"),
            TxStatus::DryRun => write!(f, "dryrun"),
        }
    }
}

/// Immutable audit record of one swap attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxLogEntry {
    pub id: String,
    pub account_id: AccountId,
    pub wallet: String,
    pub mode: TradingMode,
    pub action: SwapAction,
    pub input_mint: String,
    pub output_mint: String,
    pub input_amount: Decimal,
    pub output_amount: Decimal,
    pub volume_sol: Decimal,
    pub status: TxStatus,
    pub tx_id: Option<String>,
    pub fee_tx_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TxLogEntry {
    fn base(account_id: &str, intent: &SwapIntent, status: TxStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            wallet: intent.wallet.clone(),
            mode: intent.mode,
            action: intent.action,
            input_mint: intent.input_mint.clone(),
            output_mint: intent.output_mint.clone(),
            input_amount: intent.amount,
            output_amount: Decimal::ZERO,
            volume_sol: Decimal::ZERO,
            status,
            tx_id: None,
            fee_tx_id: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn settled(account_id: &str, intent: &SwapIntent, result: &SwapResult) -> Self {
        let status = if result.dry_run { TxStatus::DryRun } else { TxStatus::Confirmed };
        Self {
            input_amount: result.input_amount,
            output_amount: result.output_amount,
            volume_sol: result.volume_sol,
            tx_id: Some(result.tx_id.clone()),
            fee_tx_id: result.fee_tx_id.clone(),
            ..Self::base(account_id, intent, status)
        }
    }

    pub fn failed(account_id: &str, intent: &SwapIntent, error: &SwapError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::base(account_id, intent, TxStatus::Failed)
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a single swap attempt, classified by how the executor reacts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    /// Upstream throttling. Retried after a widening backoff window.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Slippage, insufficient funds, program rejection, bad input. Never retried.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),
    /// Network errors, timeouts, 5xx. Retried with short exponential backoff.
    #[error("transient: {0}")]
    Transient(String),
}

impl SwapError {
    /// Classify an upstream HTTP or RPC failure from its status code and body.
    pub fn classify(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();

        if status == 429
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            return SwapError::RateLimited(format!("HTTP {status}: {body}"));
        }

        if Self::is_unrecoverable_message(&lower) {
            return SwapError::Unrecoverable(format!("HTTP {status}: {body}"));
        }

        if status >= 500 || status == 408 || status == 0 {
            return SwapError::Transient(format!("HTTP {status}: {body}"));
        }

        // Remaining 4xx are request problems; retrying the same request won't help.
        if (400..500).contains(&status) {
            return SwapError::Unrecoverable(format!("HTTP {status}: {body}"));
        }

        SwapError::Transient(format!("HTTP {status}: {body}"))
    }

    /// Classify a free-form error message (RPC simulation logs, confirmation errors).
    pub fn from_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
            SwapError::RateLimited(msg.to_string())
        } else if Self::is_unrecoverable_message(&lower) {
            SwapError::Unrecoverable(msg.to_string())
        } else {
            SwapError::Transient(msg.to_string())
        }
    }

    fn is_unrecoverable_message(lower: &str) -> bool {
        lower.contains("slippage")
            || lower.contains("0x1771")
            || lower.contains("insufficient")
            || lower.contains("custom program error")
            || lower.contains("program failed")
            || lower.contains("instructionerror")
            || lower.contains("could not find any route")
            || lower.contains("no route")
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SwapError::RateLimited(_))
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, SwapError::Unrecoverable(_))
    }
}

/// Configuration and validation failures surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("invalid token mint: {0}")]
    InvalidMint(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("no active wallets for account {0}")]
    NoWallets(AccountId),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
