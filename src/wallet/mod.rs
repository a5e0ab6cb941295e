//! Wallet key handles.
//!
//! Key material never enters this process. A `SigningKey` is an opaque
//! handle that knows its public address and can sign on request; a
//! `KeyVault` resolves the handles for an account's active wallets.

pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{Account, Transfer};

/// An opaque signer for one sub-wallet.
#[async_trait]
pub trait SigningKey: Send + Sync {
    /// Base58 public address.
    fn address(&self) -> &str;

    /// Sign a base64 serialized transaction, returning the signed base64.
    async fn sign_transaction(&self, unsigned_tx: &str) -> Result<String>;

    /// Build and sign a native transfer transaction with the given legs.
    async fn sign_transfers(&self, transfers: &[Transfer], recent_blockhash: &str) -> Result<String>;
}

/// Resolves an account's active wallets into signing handles.
#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Handles in a stable order, restricted to the account's active subset
    /// when one is configured.
    async fn resolve_signing_keys(&self, account: &Account) -> Result<Vec<Arc<dyn SigningKey>>>;
}

/// Keep only wallets named in `active`, preserving vault order. Empty `active` keeps all.
pub fn filter_active<T, F>(wallets: Vec<T>, active: &[String], address: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    if active.is_empty() {
        return wallets;
    }
    wallets
        .into_iter()
        .filter(|w| active.iter().any(|a| a == address(w)))
        .collect()
}
