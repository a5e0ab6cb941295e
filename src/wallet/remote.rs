//! Signer-service backed key vault.
//!
//! Private keys live in a separate signer service. This process only sees
//! public addresses and hands it transactions to sign:
//!
//! - `GET  /accounts/{id}/wallets`          → `{"wallets": ["<address>", ...]}`
//! - `POST /wallets/{address}/sign`         → `{"signedTransaction": "<b64>"}`
//! - `POST /wallets/{address}/transfers`    → `{"signedTransaction": "<b64>"}`

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{filter_active, KeyVault, SigningKey};
use crate::types::{Account, Transfer};

#[derive(Debug, Deserialize)]
struct WalletList {
    wallets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SignedResponse {
    #[serde(rename = "signedTransaction")]
    signed_transaction: String,
}

struct SignerHttp {
    http: Client,
    base_url: String,
    token: Option<Secret<String>>,
}

impl SignerHttp {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn post_signed(&self, path: &str, body: serde_json::Value) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorize(self.http.post(&url).json(&body))
            .send()
            .await
            .with_context(|| format!("Signer request failed: {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Signer returned {status} for {path}: {text}");
        }

        let signed: SignedResponse = response
            .json()
            .await
            .context("Malformed signer response")?;
        Ok(signed.signed_transaction)
    }
}

/// Handle for one wallet held by the signer service.
pub struct RemoteSigningKey {
    signer: Arc<SignerHttp>,
    address: String,
}

#[async_trait]
impl SigningKey for RemoteSigningKey {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_transaction(&self, unsigned_tx: &str) -> Result<String> {
        let path = format!("/wallets/{}/sign", urlencoding::encode(&self.address));
        self.signer
            .post_signed(&path, json!({ "transaction": unsigned_tx }))
            .await
    }

    async fn sign_transfers(&self, transfers: &[Transfer], recent_blockhash: &str) -> Result<String> {
        let path = format!("/wallets/{}/transfers", urlencoding::encode(&self.address));
        self.signer
            .post_signed(
                &path,
                json!({ "recentBlockhash": recent_blockhash, "transfers": transfers }),
            )
            .await
    }
}

pub struct RemoteKeyVault {
    signer: Arc<SignerHttp>,
}

impl RemoteKeyVault {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build signer HTTP client")?;
        Ok(Self {
            signer: Arc::new(SignerHttp {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                token: token.map(Secret::new),
            }),
        })
    }

    fn handles(&self, addresses: Vec<String>, active: &[String]) -> Vec<Arc<dyn SigningKey>> {
        filter_active(addresses, active, |a| a.as_str())
            .into_iter()
            .map(|address| {
                Arc::new(RemoteSigningKey {
                    signer: self.signer.clone(),
                    address,
                }) as Arc<dyn SigningKey>
            })
            .collect()
    }
}

#[async_trait]
impl KeyVault for RemoteKeyVault {
    async fn resolve_signing_keys(&self, account: &Account) -> Result<Vec<Arc<dyn SigningKey>>> {
        let url = format!(
            "{}/accounts/{}/wallets",
            self.signer.base_url,
            urlencoding::encode(&account.id)
        );
        let response = self
            .signer
            .authorize(self.signer.http.get(&url))
            .send()
            .await
            .context("Wallet listing request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Signer returned {status} listing wallets for {}: {text}", account.id);
        }

        let list: WalletList = response.json().await.context("Malformed wallet list")?;
        let keys = self.handles(list.wallets, &account.trading.active_wallets);
        debug!(account_id = %account.id, wallets = keys.len(), "Resolved signing keys");
        Ok(keys)
    }
}
