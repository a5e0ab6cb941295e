//! Jupiter aggregator integration.
//!
//! `/quote` prices a route, `/swap` turns the quote into an unsigned
//! versioned transaction for the wallet. The wallet's `SigningKey` signs it
//! and the result is submitted over JSON-RPC.
//!
//! Quote API: https://quote-api.jup.ag/v6

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::rpc::send_transaction;
use super::SwapProvider;
use crate::types::{ExecuteOptions, ExecutedSwap, Quote, SwapError};
use crate::wallet::SigningKey;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "inputMint")]
    input_mint: String,
    #[serde(rename = "outputMint")]
    output_mint: String,
    #[serde(rename = "inAmount")]
    in_amount: String,
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(default, rename = "slippageBps")]
    slippage_bps: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
}

/// Turn a raw `/quote` body into a `Quote`, keeping the full route for `/swap`.
fn parse_quote(body: &str, requested_slippage: u16) -> Result<Quote, SwapError> {
    let route: Value = serde_json::from_str(body)
        .map_err(|e| SwapError::Transient(format!("malformed quote: {e}")))?;
    let parsed: QuoteResponse = serde_json::from_value(route.clone())
        .map_err(|e| SwapError::Unrecoverable(format!("unexpected quote shape: {e}")))?;

    let in_amount = parsed
        .in_amount
        .parse()
        .map_err(|_| SwapError::Unrecoverable(format!("bad inAmount {}", parsed.in_amount)))?;
    let out_amount = parsed
        .out_amount
        .parse()
        .map_err(|_| SwapError::Unrecoverable(format!("bad outAmount {}", parsed.out_amount)))?;

    Ok(Quote {
        input_mint: parsed.input_mint,
        output_mint: parsed.output_mint,
        in_amount,
        out_amount,
        slippage_bps: parsed.slippage_bps.unwrap_or(requested_slippage),
        route,
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct JupiterClient {
    http: Client,
    base_url: String,
    /// Submission endpoint used when an account has no custom RPC.
    default_rpc_url: String,
}

impl JupiterClient {
    pub fn new(base_url: &str, timeout: Duration, default_rpc_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Jupiter HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_rpc_url: default_rpc_url.to_string(),
        })
    }

    fn quote_url(&self, input_mint: &str, output_mint: &str, raw_amount: u64, slippage_bps: u16) -> String {
        format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url,
            urlencoding::encode(input_mint),
            urlencoding::encode(output_mint),
            raw_amount,
            slippage_bps,
        )
    }

    async fn build_swap(&self, quote: &Quote, user: &str, options: &ExecuteOptions) -> Result<String, SwapError> {
        let mut body = json!({
            "quoteResponse": quote.route,
            "userPublicKey": user,
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        });
        if let Some(fee) = options.priority_fee_lamports {
            body["prioritizationFeeLamports"] = json!(fee);
        }

        let response = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SwapError::Transient(format!("swap build: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SwapError::Transient(format!("swap build: reading body: {e}")))?;
        if !status.is_success() {
            return Err(SwapError::classify(status.as_u16(), &text));
        }

        let parsed: SwapResponse = serde_json::from_str(&text)
            .map_err(|e| SwapError::Transient(format!("malformed swap response: {e}")))?;
        Ok(parsed.swap_transaction)
    }
}

#[async_trait]
impl SwapProvider for JupiterClient {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        raw_amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, SwapError> {
        let url = self.quote_url(input_mint, output_mint, raw_amount, slippage_bps);
        debug!(input_mint, output_mint, raw_amount, "Requesting quote");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SwapError::Transient(format!("quote: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SwapError::Transient(format!("quote: reading body: {e}")))?;
        if !status.is_success() {
            return Err(SwapError::classify(status.as_u16(), &text));
        }

        parse_quote(&text, slippage_bps)
    }

    async fn execute(
        &self,
        quote: &Quote,
        signer: &dyn SigningKey,
        options: &ExecuteOptions,
    ) -> Result<ExecutedSwap, SwapError> {
        let unsigned = self.build_swap(quote, signer.address(), options).await?;

        let signed = signer
            .sign_transaction(&unsigned)
            .await
            .map_err(|e| SwapError::from_message(&format!("signing: {e:#}")))?;

        let rpc_url = options.rpc_url.as_deref().unwrap_or(&self.default_rpc_url);
        let tx_id = send_transaction(&self.http, rpc_url, &signed).await?;

        info!(
            wallet = %signer.address(),
            input = %quote.input_mint,
            output = %quote.output_mint,
            in_amount = quote.in_amount,
            tx_id = %tx_id,
            "Swap submitted"
        );
        Ok(ExecutedSwap { tx_id })
    }
}
