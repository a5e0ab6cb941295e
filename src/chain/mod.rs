//! Chain and swap-aggregator integrations.
//!
//! Defines the `SwapProvider` and `ChainClient` traits and provides
//! HTTP implementations for:
//! - Jupiter-compatible aggregators (quote + swap transaction build)
//! - Solana JSON-RPC (balances, decimals, confirmation, transfers)

pub mod jupiter;
pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ExecuteOptions, ExecutedSwap, Quote, SwapError, TokenAmount, Transfer};
use crate::wallet::SigningKey;

/// Black-box swap routing. Pricing and routing happen upstream.
#[async_trait]
pub trait SwapProvider: Send + Sync {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        raw_amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, SwapError>;

    /// Build, sign and submit the swap described by `quote`.
    async fn execute(
        &self,
        quote: &Quote,
        signer: &dyn SigningKey,
        options: &ExecuteOptions,
    ) -> Result<ExecutedSwap, SwapError>;
}

/// Read and confirm chain state.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Wait for `tx_id` to reach confirmed commitment.
    async fn confirm(&self, tx_id: &str) -> Result<(), SwapError>;

    async fn native_balance(&self, address: &str) -> Result<u64>;

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<TokenAmount>;

    async fn mint_decimals(&self, mint: &str) -> Result<u8>;

    /// Submit one transaction carrying every leg in `transfers`, signed by
    /// `payer`, and wait for confirmation. Returns the transaction id.
    async fn send_transfers(&self, payer: &dyn SigningKey, transfers: &[Transfer]) -> Result<String>;
}
