//! Process-wide mint decimals cache.

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::chain::ChainClient;
use crate::types::{NATIVE_DECIMALS, NATIVE_MINT};

pub const DEFAULT_DECIMALS_TTL: Duration = Duration::from_secs(300);

pub struct MintDecimalsCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (u8, Instant)>>,
}

impl MintDecimalsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Decimals for `mint`. The native mint is answered without a lookup.
    pub async fn get(&self, chain: &dyn ChainClient, mint: &str) -> Result<u8> {
        if mint == NATIVE_MINT {
            return Ok(NATIVE_DECIMALS);
        }

        if let Some((decimals, fetched_at)) = self.entries.read().await.get(mint) {
            if fetched_at.elapsed() < self.ttl {
                return Ok(*decimals);
            }
        }

        let decimals = chain.mint_decimals(mint).await?;
        self.entries
            .write()
            .await
            .insert(mint.to_string(), (decimals, Instant::now()));
        Ok(decimals)
    }
}

impl Default for MintDecimalsCache {
    fn default() -> Self {
        Self::new(DEFAULT_DECIMALS_TTL)
    }
}
