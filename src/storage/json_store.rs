//! JSON file account store.
//!
//! Keeps every account in memory and writes the whole file through on each
//! mutation. Suitable for a single-process deployment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::AccountStore;
use crate::types::{Account, AccountId, EngineError, Tier};

/// Default accounts file path.
pub const DEFAULT_ACCOUNTS_FILE: &str = "accounts.json";

pub struct JsonAccountStore {
    path: PathBuf,
    accounts: RwLock<BTreeMap<AccountId, Account>>,
}

impl JsonAccountStore {
    /// Open the store at `path`, starting empty if the file doesn't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let accounts = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let json = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read accounts from {}", path.display()))?;
            let list: Vec<Account> = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse accounts from {}", path.display()))?;
            info!(path = %path.display(), accounts = list.len(), "Accounts loaded from disk");
            list.into_iter().map(|a| (a.id.clone(), a)).collect()
        } else {
            info!(path = %path.display(), "No accounts file found, starting empty");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            accounts: RwLock::new(accounts),
        })
    }

    async fn persist(&self, accounts: &BTreeMap<AccountId, Account>) -> Result<()> {
        let list: Vec<&Account> = accounts.values().collect();
        let json = serde_json::to_string_pretty(&list).context("Failed to serialise accounts")?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("Failed to write accounts to {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), accounts = list.len(), "Accounts saved");
        Ok(())
    }

    /// Apply `f` to one account and write the file through. Memory only
    /// changes once the write succeeded.
    async fn update<T>(&self, id: &str, f: impl FnOnce(&mut Account) -> T) -> Result<T> {
        let mut accounts = self.accounts.write().await;
        let mut next = accounts.clone();
        let account = next
            .get_mut(id)
            .ok_or_else(|| EngineError::AccountNotFound(id.to_string()))?;
        let out = f(account);
        self.persist(&next).await?;
        *accounts = next;
        Ok(out)
    }
}

#[async_trait]
impl AccountStore for JsonAccountStore {
    async fn load(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let mut next = accounts.clone();
        next.insert(account.id.clone(), account.clone());
        self.persist(&next).await?;
        *accounts = next;
        Ok(())
    }

    async fn set_running(&self, id: &str, running: bool) -> Result<()> {
        self.update(id, |a| a.running = running).await
    }

    async fn add_volume(&self, id: &str, delta: Decimal) -> Result<Decimal> {
        self.update(id, |a| {
            a.cumulative_volume += delta;
            a.cumulative_volume
        })
        .await
    }

    async fn set_tier(&self, id: &str, tier: Tier) -> Result<()> {
        self.update(id, |a| a.tier = tier).await
    }

    async fn credit_rewards(&self, id: &str, lamports: u64) -> Result<()> {
        self.update(id, |a| {
            a.earned_rewards_lamports = a.earned_rewards_lamports.saturating_add(lamports)
        })
        .await
    }

    async fn running_accounts(&self) -> Result<Vec<AccountId>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.running)
            .map(|a| a.id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
