//! Persistence layer.
//!
//! Account records and the swap audit ledger live behind the
//! `AccountStore` and `LedgerWriter` traits. The engine only performs
//! field-level updates on accounts so that concurrent writers (the loop,
//! a stop request, fee crediting) never overwrite each other's fields.
//!
//! Adapters: a JSON file store for accounts and a SQLite ledger.

pub mod json_store;
pub mod ledger;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Account, AccountId, Tier, TxLogEntry};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// `Ok(None)` when the account does not exist.
    async fn load(&self, id: &str) -> Result<Option<Account>>;

    /// Replace the whole record. Administrative use only.
    async fn save(&self, account: &Account) -> Result<()>;

    async fn set_running(&self, id: &str, running: bool) -> Result<()>;

    /// Add `delta` SOL to the cumulative volume and return the new total.
    async fn add_volume(&self, id: &str, delta: Decimal) -> Result<Decimal>;

    async fn set_tier(&self, id: &str, tier: Tier) -> Result<()>;

    /// Add to the account's earned referral rewards.
    async fn credit_rewards(&self, id: &str, lamports: u64) -> Result<()>;

    /// Ids of accounts persisted with `running = true`.
    async fn running_accounts(&self) -> Result<Vec<AccountId>>;
}

/// Append-only audit sink. Implementations log and swallow their own failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn append(&self, entry: TxLogEntry);
}
