//! Solana JSON-RPC client.
//!
//! Only the handful of methods the engine needs: balances, mint decimals,
//! signature status polling, blockhash, and raw transaction submission.
//! Transactions arrive pre-signed from a `SigningKey`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::ChainClient;
use crate::types::{SwapError, TokenAmount, Transfer};
use crate::wallet::SigningKey;

const COMMITMENT: &str = "confirmed";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Issue one JSON-RPC call against `url`, classifying failures for retry.
pub async fn rpc_call(http: &Client, url: &str, method: &str, params: Value) -> Result<Value, SwapError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response = http
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| SwapError::Transient(format!("{method}: {e}")))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| SwapError::Transient(format!("{method}: reading body: {e}")))?;

    if !status.is_success() {
        return Err(SwapError::classify(status.as_u16(), &text));
    }

    let parsed: RpcResponse = serde_json::from_str(&text)
        .map_err(|e| SwapError::Transient(format!("{method}: malformed response: {e}")))?;

    if let Some(err) = parsed.error {
        let detail = match &err.data {
            Some(data) => format!("{method}: {} ({}) {data}", err.message, err.code),
            None => format!("{method}: {} ({})", err.message, err.code),
        };
        // -32005 is the node's "too many requests" code
        if err.code == -32005 || err.code == 429 {
            return Err(SwapError::RateLimited(detail));
        }
        return Err(SwapError::from_message(&detail));
    }

    parsed
        .result
        .ok_or_else(|| SwapError::Transient(format!("{method}: empty result")))
}

/// Submit a signed base64 transaction. Returns the signature.
pub async fn send_transaction(http: &Client, url: &str, signed_tx: &str) -> Result<String, SwapError> {
    let result = rpc_call(
        http,
        url,
        "sendTransaction",
        json!([signed_tx, { "encoding": "base64", "maxRetries": 3 }]),
    )
    .await?;
    result
        .as_str()
        .map(String::from)
        .ok_or_else(|| SwapError::Transient("sendTransaction: signature missing".to_string()))
}

/// Sum every token account `owner` holds for one mint.
fn parse_token_accounts(value: &Value) -> Option<TokenAmount> {
    let accounts = value.get("value")?.as_array()?;
    let mut total: u64 = 0;
    let mut decimals = None;
    for account in accounts {
        let amount = account.pointer("/account/data/parsed/info/tokenAmount")?;
        let raw: u64 = amount.get("amount")?.as_str()?.parse().ok()?;
        total = total.saturating_add(raw);
        decimals = amount.get("decimals").and_then(Value::as_u64).map(|d| d as u8);
    }
    decimals.map(|decimals| TokenAmount { raw: total, decimals })
}

#[derive(Debug, PartialEq, Eq)]
enum SignatureState {
    Pending,
    Confirmed,
    Failed(String),
}

fn parse_signature_status(value: &Value) -> SignatureState {
    let Some(status) = value.pointer("/value/0").filter(|v| !v.is_null()) else {
        return SignatureState::Pending;
    };
    if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
        return SignatureState::Failed(err.to_string());
    }
    match status.get("confirmationStatus").and_then(Value::as_str) {
        Some("confirmed") | Some("finalized") => SignatureState::Confirmed,
        _ => SignatureState::Pending,
    }
}

pub struct RpcChainClient {
    http: Client,
    url: String,
    confirm_timeout: Duration,
    confirm_poll: Duration,
}

impl RpcChainClient {
    pub fn new(url: &str, confirm_timeout: Duration, confirm_poll: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build RPC HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
            confirm_timeout,
            confirm_poll,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        rpc_call(&self.http, &self.url, method, params)
            .await
            .map_err(|e| anyhow!(e))
    }

    async fn latest_blockhash(&self) -> Result<String> {
        let result = self
            .call("getLatestBlockhash", json!([{ "commitment": COMMITMENT }]))
            .await?;
        result
            .pointer("/value/blockhash")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| anyhow!("getLatestBlockhash: missing blockhash"))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn confirm(&self, tx_id: &str) -> Result<(), SwapError> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;

        loop {
            let status = rpc_call(
                &self.http,
                &self.url,
                "getSignatureStatuses",
                json!([[tx_id], { "searchTransactionHistory": true }]),
            )
            .await;

            match status {
                Ok(value) => match parse_signature_status(&value) {
                    SignatureState::Confirmed => {
                        debug!(tx_id, "Transaction confirmed");
                        return Ok(());
                    }
                    SignatureState::Failed(err) => {
                        return Err(SwapError::Unrecoverable(format!("transaction {tx_id} failed: {err}")));
                    }
                    SignatureState::Pending => {}
                },
                // polling errors are retried until the deadline
                Err(e) => warn!(tx_id, error = %e, "Signature status query failed"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(SwapError::Transient(format!("transaction {tx_id} not confirmed in time")));
            }
            tokio::time::sleep(self.confirm_poll).await;
        }
    }

    async fn native_balance(&self, address: &str) -> Result<u64> {
        let result = self
            .call("getBalance", json!([address, { "commitment": COMMITMENT }]))
            .await?;
        result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("getBalance: missing value for {address}"))
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<TokenAmount> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": mint }, { "encoding": "jsonParsed", "commitment": COMMITMENT }]),
            )
            .await?;

        match parse_token_accounts(&result) {
            Some(amount) => Ok(amount),
            // no token account yet
            None => Ok(TokenAmount { raw: 0, decimals: self.mint_decimals(mint).await? }),
        }
    }

    async fn mint_decimals(&self, mint: &str) -> Result<u8> {
        let result = self.call("getTokenSupply", json!([mint])).await?;
        result
            .pointer("/value/decimals")
            .and_then(Value::as_u64)
            .map(|d| d as u8)
            .ok_or_else(|| anyhow!("getTokenSupply: missing decimals for {mint}"))
    }

    async fn send_transfers(&self, payer: &dyn SigningKey, transfers: &[Transfer]) -> Result<String> {
        let blockhash = self.latest_blockhash().await?;
        let signed = payer
            .sign_transfers(transfers, &blockhash)
            .await
            .context("Failed to sign transfer transaction")?;
        let signature = send_transaction(&self.http, &self.url, &signed)
            .await
            .map_err(|e| anyhow!(e))?;
        self.confirm(&signature).await.map_err(|e| anyhow!(e))?;
        Ok(signature)
    }
}
