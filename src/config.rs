//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (signer API token) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`. Engine timings carry serde
//! defaults so a minimal file only needs endpoints and fee wallets.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::bot_loop::LoopTiming;
use crate::engine::executor::RetryPolicy;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub fees: FeesConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub signer: SignerConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Skip the swap provider entirely and log `dryrun` ledger entries.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    /// Pause after a config/wallet resolution failure.
    #[serde(default = "default_error_pause_secs")]
    pub error_pause_secs: u64,
    #[serde(default = "default_cooldown_min_secs")]
    pub cooldown_min_secs: u64,
    #[serde(default = "default_cooldown_max_secs")]
    pub cooldown_max_secs: u64,
    #[serde(default = "default_balance_poll_attempts")]
    pub balance_poll_attempts: u32,
    #[serde(default = "default_balance_poll_interval_ms")]
    pub balance_poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_rate_limit_pause_ms")]
    pub rate_limit_pause_ms: u64,
    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_ms: u64,
    #[serde(default = "default_decimals_cache_ttl_secs")]
    pub decimals_cache_ttl_secs: u64,
}

fn default_slippage_bps() -> u16 { 100 }
fn default_error_pause_secs() -> u64 { 5 }
fn default_cooldown_min_secs() -> u64 { 5 }
fn default_cooldown_max_secs() -> u64 { 15 }
fn default_balance_poll_attempts() -> u32 { 5 }
fn default_balance_poll_interval_ms() -> u64 { 2_000 }
fn default_max_attempts() -> u32 { 3 }
fn default_rate_limit_pause_ms() -> u64 { 1_000 }
fn default_transient_backoff_ms() -> u64 { 400 }
fn default_decimals_cache_ttl_secs() -> u64 { 300 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            slippage_bps: default_slippage_bps(),
            error_pause_secs: default_error_pause_secs(),
            cooldown_min_secs: default_cooldown_min_secs(),
            cooldown_max_secs: default_cooldown_max_secs(),
            balance_poll_attempts: default_balance_poll_attempts(),
            balance_poll_interval_ms: default_balance_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            rate_limit_pause_ms: default_rate_limit_pause_ms(),
            transient_backoff_ms: default_transient_backoff_ms(),
            decimals_cache_ttl_secs: default_decimals_cache_ttl_secs(),
        }
    }
}

impl EngineConfig {
    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            error_pause: Duration::from_secs(self.error_pause_secs),
            cooldown_min: Duration::from_secs(self.cooldown_min_secs),
            cooldown_max: Duration::from_secs(self.cooldown_max_secs.max(self.cooldown_min_secs)),
            balance_poll_attempts: self.balance_poll_attempts.max(1),
            balance_poll_interval: Duration::from_millis(self.balance_poll_interval_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            rate_limit_pause: Duration::from_millis(self.rate_limit_pause_ms),
            transient_backoff: Duration::from_millis(self.transient_backoff_ms),
        }
    }

    pub fn decimals_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.decimals_cache_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeesConfig {
    /// Platform fee rate in basis points of SOL volume (10 = 0.1%).
    #[serde(default = "default_fee_rate_bps")]
    pub rate_bps: u64,
    pub platform_wallet: String,
    pub rewards_pool_wallet: String,
}

fn default_fee_rate_bps() -> u64 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct SwapConfig {
    #[serde(default = "default_swap_base_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_swap_base_url() -> String { "https://quote-api.jup.ag/v6".to_string() }
fn default_http_timeout_secs() -> u64 { 15 }

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            base_url: default_swap_base_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
}

fn default_confirm_timeout_secs() -> u64 { 60 }
fn default_confirm_poll_ms() -> u64 { 1_500 }

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_accounts_path")]
    pub accounts_path: String,
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,
}

fn default_accounts_path() -> String { "accounts.json".to_string() }
fn default_ledger_url() -> String { "sqlite://volumebot_ledger.db?mode=rwc".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            accounts_path: default_accounts_path(),
            ledger_url: default_ledger_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignerConfig {
    pub base_url: String,
    /// Env var holding the signer service bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: true, port: 8080 }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
