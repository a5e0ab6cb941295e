//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::engine::controller::ControllerStatus;
use crate::engine::registry::{ControllerRegistry, StartStatus, StopStatus};
use crate::storage::ledger::{LedgerRow, SqliteLedger};
use crate::storage::AccountStore;

const DEFAULT_TX_LIMIT: u32 = 50;
const MAX_TX_LIMIT: u32 = 500;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub registry: Arc<ControllerRegistry>,
    pub store: Arc<dyn AccountStore>,
    /// Absent when the ledger is not queryable (e.g. in tests).
    pub ledger: Option<Arc<SqliteLedger>>,
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub running_bots: usize,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub account_id: String,
    pub status: StartStatus,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub account_id: String,
    pub status: StopStatus,
}

#[derive(Debug, Deserialize)]
pub struct TxQuery {
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        running_bots: state.registry.list().await.len(),
    })
}

pub async fn list_bots(State(state): State<AppState>) -> Json<Vec<ControllerStatus>> {
    Json(state.registry.list().await)
}

pub async fn bot_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ControllerStatus>, StatusCode> {
    state
        .registry
        .status(&id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn start_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StartResponse>, StatusCode> {
    match state.store.load(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(account_id = %id, error = %e, "Account lookup failed");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let status = state.registry.start(&id).await;
    Ok(Json(StartResponse { account_id: id, status }))
}

pub async fn stop_bot(State(state): State<AppState>, Path(id): Path<String>) -> Json<StopResponse> {
    let status = state.registry.stop(&id).await;
    Json(StopResponse { account_id: id, status })
}

pub async fn bot_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TxQuery>,
) -> Result<Json<Vec<LedgerRow>>, StatusCode> {
    let Some(ledger) = &state.ledger else {
        return Ok(Json(Vec::new()));
    };
    let limit = query.limit.unwrap_or(DEFAULT_TX_LIMIT).min(MAX_TX_LIMIT);

    ledger.recent(&id, limit).await.map(Json).map_err(|e| {
        warn!(account_id = %id, error = %e, "Ledger query failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
