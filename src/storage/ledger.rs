//! SQLite swap ledger.
//!
//! One row per swap attempt. Writes never fail the caller: errors are
//! logged and dropped so a ledger outage can't stall trading.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{info, warn};

use super::LedgerWriter;
use crate::types::TxLogEntry;

pub struct SqliteLedger {
    pool: SqlitePool,
}

/// Summary row for the status API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerRow {
    pub id: String,
    pub wallet: String,
    pub mode: String,
    pub action: String,
    pub status: String,
    pub input_amount: Decimal,
    pub output_amount: Decimal,
    pub volume_sol: Decimal,
    pub tx_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SqliteLedger {
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid ledger url: {url}"))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // in-memory databases are per-connection
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to connect to ledger database")?;

        let ledger = Self { pool };
        ledger.initialize().await?;
        info!(url, "Ledger ready");
        Ok(ledger)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tx_log (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                wallet TEXT NOT NULL,
                mode TEXT NOT NULL,
                action TEXT NOT NULL,
                input_mint TEXT NOT NULL,
                output_mint TEXT NOT NULL,
                input_amount TEXT NOT NULL,
                output_amount TEXT NOT NULL,
                volume_sol TEXT NOT NULL,
                status TEXT NOT NULL,
                tx_id TEXT,
                fee_tx_id TEXT,
                error TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tx_log_account ON tx_log(account_id, created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert(&self, entry: &TxLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tx_log (
                id, account_id, wallet, mode, action, input_mint, output_mint,
                input_amount, output_amount, volume_sol, status, tx_id, fee_tx_id,
                error, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.account_id)
        .bind(&entry.wallet)
        .bind(entry.mode.to_string())
        .bind(entry.action.to_string())
        .bind(&entry.input_mint)
        .bind(&entry.output_mint)
        .bind(entry.input_amount.to_string())
        .bind(entry.output_amount.to_string())
        .bind(entry.volume_sol.to_string())
        .bind(entry.status.to_string())
        .bind(&entry.tx_id)
        .bind(&entry.fee_tx_id)
        .bind(&entry.error)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent entries for one account, newest first.
    pub async fn recent(&self, account_id: &str, limit: u32) -> Result<Vec<LedgerRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet, mode, action, status, input_amount, output_amount,
                   volume_sol, tx_id, error, created_at
            FROM tx_log WHERE account_id = ?
            ORDER BY created_at DESC LIMIT ?
            "#,
        )
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decimal = |col: &str| -> Result<Decimal> {
                    let s: String = row.try_get(col)?;
                    Decimal::from_str(&s).with_context(|| format!("Bad decimal in {col}: {s}"))
                };
                let created: String = row.try_get("created_at")?;
                Ok(LedgerRow {
                    id: row.try_get("id")?,
                    wallet: row.try_get("wallet")?,
                    mode: row.try_get("mode")?,
                    action: row.try_get("action")?,
                    status: row.try_get("status")?,
                    input_amount: decimal("input_amount")?,
                    output_amount: decimal("output_amount")?,
                    volume_sol: decimal("volume_sol")?,
                    tx_id: row.try_get("tx_id")?,
                    error: row.try_get("error")?,
                    created_at: DateTime::parse_from_rfc3339(&created)?.with_timezone(&Utc),
                })
            })
            .collect()
    }
}

#[async_trait]
impl LedgerWriter for SqliteLedger {
    async fn append(&self, entry: TxLogEntry) {
        if let Err(e) = self.insert(&entry).await {
            warn!(
                account_id = %entry.account_id,
                status = %entry.status,
                error = %e,
                "Failed to append ledger entry"
            );
        }
    }
}
