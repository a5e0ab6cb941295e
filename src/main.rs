//! VOLUMEBOT: multi-account Solana volume bot engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the chain, signer and storage adapters into the engine, restarts
//! every account persisted as running, and waits for Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use volumebot::chain::jupiter::JupiterClient;
use volumebot::chain::rpc::RpcChainClient;
use volumebot::chain::{ChainClient, SwapProvider};
use volumebot::config::AppConfig;
use volumebot::dashboard::{self, DashboardState};
use volumebot::engine::bot_loop::BotEngine;
use volumebot::engine::decimals::MintDecimalsCache;
use volumebot::engine::executor::SwapExecutor;
use volumebot::engine::registry::ControllerRegistry;
use volumebot::engine::settlement::SwapSettlement;
use volumebot::fees::FeeEngine;
use volumebot::storage::json_store::JsonAccountStore;
use volumebot::storage::ledger::SqliteLedger;
use volumebot::storage::{AccountStore, LedgerWriter};
use volumebot::wallet::remote::RemoteKeyVault;

const BANNER: &str = r#"
__     _____  _     _   _ __  __ _____ ____   ___ _____
\ \   / / _ \| |   | | | |  \/  | ____| __ ) / _ \_   _|
 \ \ / / | | | |   | | | | |\/| |  _| |  _ \| | | || |
  \ V /| |_| | |___| |_| | |  | | |___| |_) | |_| || |
   \_/  \___/|_____|\___/|_|  |_|_____|____/ \___/ |_|

  Multi-account volume engine
  v0.1.0
"#;

/// How long shutdown waits for loops to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        dry_run = cfg.engine.dry_run,
        fee_rate_bps = cfg.fees.rate_bps,
        rpc = %cfg.chain.rpc_url,
        "VOLUMEBOT starting up"
    );
    if cfg.engine.dry_run {
        warn!("Dry-run mode: no transactions will be submitted");
    }

    // -- Adapters ----------------------------------------------------------

    let store: Arc<dyn AccountStore> = Arc::new(JsonAccountStore::open(&cfg.storage.accounts_path).await?);
    let ledger = Arc::new(SqliteLedger::connect(&cfg.storage.ledger_url).await?);

    let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(
        &cfg.chain.rpc_url,
        Duration::from_secs(cfg.chain.confirm_timeout_secs),
        Duration::from_millis(cfg.chain.confirm_poll_ms),
    )?);
    let provider: Arc<dyn SwapProvider> = Arc::new(JupiterClient::new(
        &cfg.swap.base_url,
        Duration::from_secs(cfg.swap.timeout_secs),
        &cfg.chain.rpc_url,
    )?);

    let signer_token = match cfg.signer.api_key_env.as_deref() {
        Some(env) => Some(AppConfig::resolve_env(env)?),
        None => None,
    };
    let vault = Arc::new(RemoteKeyVault::new(&cfg.signer.base_url, signer_token)?);

    // -- Engine ------------------------------------------------------------

    let fees = Arc::new(FeeEngine::new(store.clone(), chain.clone(), &cfg.fees));
    let decimals = Arc::new(MintDecimalsCache::new(cfg.engine.decimals_cache_ttl()));
    let settlement = Arc::new(SwapSettlement::new(
        provider,
        chain.clone(),
        store.clone(),
        ledger.clone() as Arc<dyn LedgerWriter>,
        fees,
        decimals,
        cfg.engine.dry_run,
        cfg.engine.slippage_bps,
    ));
    let executor = Arc::new(SwapExecutor::new(settlement, cfg.engine.retry_policy()));

    let engine = Arc::new(BotEngine {
        store: store.clone(),
        vault,
        chain,
        executor,
        timing: cfg.engine.loop_timing(),
    });
    let registry = ControllerRegistry::new(engine);

    // -- Restore running bots ----------------------------------------------

    match store.running_accounts().await {
        Ok(ids) => {
            info!(count = ids.len(), "Restoring running bots");
            registry.start_all(&ids).await;
        }
        Err(e) => warn!(error = %e, "Failed to list running accounts"),
    }

    // -- Dashboard -----------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState {
            registry: registry.clone(),
            store: store.clone(),
            ledger: Some(ledger.clone()),
        });
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    // -- Wait for shutdown -----------------------------------------------------

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, stopping all bots");

    // Loops persist running=false on exit; restore the flags afterwards so a
    // process restart picks the same bots back up.
    let restart_ids = store.running_accounts().await.unwrap_or_default();
    registry.stop_all().await;
    if !registry.drain(SHUTDOWN_GRACE).await {
        warn!("Some bots did not stop within the grace period");
    }
    for id in &restart_ids {
        if let Err(e) = store.set_running(id, true).await {
            warn!(account_id = %id, error = %e, "Failed to restore running flag");
        }
    }

    info!("VOLUMEBOT shut down cleanly");
    Ok(())
}

/// Initialise tracing with env-filter and optional JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("volumebot=info"));

    let json_logging = std::env::var("VOLUMEBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
