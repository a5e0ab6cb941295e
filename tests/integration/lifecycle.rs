//! Controller lifecycle: start, stop, resume, fatal exit.

use std::sync::atomic::Ordering;
use std::time::Duration;

use volumebot::engine::registry::{StartStatus, StopStatus};
use volumebot::storage::AccountStore;
use volumebot::types::*;

use crate::mocks::{account, Harness};

fn running(h: &Harness, id: &str) -> bool {
    h.store.get(id).map(|a| a.running).unwrap_or(false)
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], true);
    h.vault.set("a", &["W1"]);

    assert_eq!(h.registry.start("a").await, StartStatus::Started);
    assert_eq!(h.registry.start("a").await, StartStatus::AlreadyRunning);
    assert!(running(&h, "a"));
    assert_eq!(h.registry.list().await.len(), 1);

    assert_eq!(h.registry.stop("a").await, StopStatus::Stopping);
    assert_eq!(h.registry.stop("a").await, StopStatus::AlreadyStopping);
    assert!(h.registry.drain(Duration::from_secs(30)).await);

    assert!(!running(&h, "a"));
    assert!(h.registry.status("a").await.is_none());
    assert_eq!(h.registry.stop("a").await, StopStatus::NotRunning);
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_start_resumes_same_loop() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], true);
    h.vault.set("a", &["W1", "W2"]);

    h.registry.start("a").await;
    let generation = h.registry.status("a").await.unwrap().generation;

    assert_eq!(h.registry.stop("a").await, StopStatus::Stopping);
    assert!(!running(&h, "a"));
    assert_eq!(h.registry.start("a").await, StartStatus::Resumed);
    assert!(running(&h, "a"));

    // the resumed loop keeps trading under the same generation
    tokio::time::sleep(Duration::from_secs(30)).await;
    let status = h.registry.status("a").await.expect("still registered");
    assert_eq!(status.generation, generation);
    assert!(status.stop_requested_at.is_none());
    assert!(running(&h, "a"));
    assert!(!h.ledger.with_status(TxStatus::DryRun).is_empty());

    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
    assert!(!running(&h, "a"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_unknown_account_persists_false() {
    let mut acc = account("a", TradingMode::Bump);
    acc.running = true;
    let h = Harness::new(vec![acc], true);

    assert_eq!(h.registry.stop("a").await, StopStatus::NotRunning);
    assert!(!running(&h, "a"));
}

#[tokio::test(start_paused = true)]
async fn test_loop_exits_when_disabled_externally() {
    let h = Harness::new(vec![account("a", TradingMode::Moonshot)], true);
    h.vault.set("a", &["W1"]);
    h.registry.start("a").await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    // another writer clears the flag without going through the registry
    let mut acc = h.store.get("a").unwrap();
    acc.running = false;
    h.store.save(&acc).await.unwrap();

    assert!(h.registry.drain(Duration::from_secs(60)).await);
    assert!(!h.registry.is_running("a").await);
}

#[tokio::test(start_paused = true)]
async fn test_start_all_restores_persisted_accounts() {
    let mut a = account("a", TradingMode::Bump);
    a.running = true;
    let b = account("b", TradingMode::Bump);
    let h = Harness::new(vec![a, b], true);
    h.vault.set("a", &["W1"]);
    h.vault.set("b", &["W2"]);

    let ids = h.store.running_accounts().await.unwrap();
    h.registry.start_all(&ids).await;

    assert!(h.registry.is_running("a").await);
    assert!(!h.registry.is_running("b").await);

    h.registry.stop_all().await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_calls_provider() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], true);
    h.vault.set("a", &["W1", "W2"]);
    h.registry.start("a").await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);

    assert_eq!(h.provider.quote_count(), 0);
    let entries = h.ledger.entries();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.status == TxStatus::DryRun));
    assert!(entries
        .iter()
        .all(|e| e.tx_id.as_deref().is_some_and(|t| t.starts_with("dryrun_a_buy_"))));

    let volume: rust_decimal::Decimal = entries.iter().map(|e| e.volume_sol).sum();
    assert_eq!(h.store.get("a").unwrap().cumulative_volume, volume);
}

#[tokio::test(start_paused = true)]
async fn test_no_wallets_never_swaps() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], true);
    h.registry.start("a").await;

    tokio::time::sleep(Duration::from_secs(30)).await;

    let status = h.registry.status("a").await.expect("loop keeps retrying");
    assert_eq!(status.last_error.unwrap().message, "no active wallets for account a");
    assert!(h.ledger.entries().is_empty());
    assert!(running(&h, "a"));

    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_mint_is_retried_not_fatal() {
    let mut acc = account("a", TradingMode::Bump);
    acc.trading.token_mint = "not-a-mint".to_string();
    let h = Harness::new(vec![acc], true);
    h.vault.set("a", &["W1"]);
    h.registry.start("a").await;

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(h.registry.is_running("a").await);
    assert!(h.ledger.entries().is_empty());

    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
}

#[tokio::test(start_paused = true)]
async fn test_underfunded_wallets_stop_bot() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], false);
    h.vault.set("a", &["W1", "W2", "W3", "W4"]);
    h.provider
        .fail_always(SwapError::Unrecoverable("insufficient lamports".to_string()));

    h.registry.start("a").await;
    let stopped = h.run_until(Duration::from_secs(300), || !running(&h, "a")).await;

    assert!(stopped, "bot should stop on confirmed insufficient funds");
    assert!(h.registry.drain(Duration::from_secs(5)).await);
    // only the sampled wallets were probed
    assert_eq!(h.chain.balance_queries.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_keeps_bot_running() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], false);
    h.vault.set("a", &["W1", "W2"]);
    h.provider
        .fail_always(SwapError::Unrecoverable("insufficient lamports".to_string()));
    h.chain.fail_balances.store(true, Ordering::SeqCst);

    h.registry.start("a").await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert!(h.chain.balance_queries.load(Ordering::SeqCst) > 0);
    assert!(h.registry.is_running("a").await);
    assert!(running(&h, "a"));

    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
}

#[tokio::test(start_paused = true)]
async fn test_funded_wallet_keeps_bot_running() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], false);
    h.vault.set("a", &["W1", "W2"]);
    h.chain.set_native("W2", LAMPORTS_PER_SOL);
    h.provider
        .fail_always(SwapError::Unrecoverable("slippage tolerance exceeded".to_string()));

    h.registry.start("a").await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert!(h.registry.is_running("a").await);
    let status = h.registry.status("a").await.unwrap();
    assert!(status.failed_cycles < 3);

    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
}

#[tokio::test(start_paused = true)]
async fn test_resume_during_account_read_keeps_loop_alive() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], true);
    h.vault.set("a", &["W1"]);
    let gate = h.store.gate_loads();

    assert_eq!(h.registry.start("a").await, StartStatus::Started);
    // loop is parked inside its first account read
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.registry.stop("a").await, StopStatus::Stopping);
    gate.add_permits(1);
    // the loop now holds a snapshot with running = false
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.registry.start("a").await, StartStatus::Resumed);

    h.store.ungate_loads();
    gate.add_permits(1);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(h.registry.is_running("a").await);
    assert!(running(&h, "a"));
    assert!(!h.ledger.with_status(TxStatus::DryRun).is_empty());

    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
    assert!(!running(&h, "a"));
}

#[tokio::test(start_paused = true)]
async fn test_crashed_loop_is_retired() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], true);
    h.vault.set("a", &["W1"]);
    h.store.panic_on_load.store(true, Ordering::SeqCst);

    assert_eq!(h.registry.start("a").await, StartStatus::Started);
    assert!(h.registry.drain(Duration::from_secs(5)).await);
    assert!(!h.registry.is_running("a").await);
    assert!(!running(&h, "a"));

    // the account can be started again once the fault clears
    h.store.panic_on_load.store(false, Ordering::SeqCst);
    assert_eq!(h.registry.start("a").await, StartStatus::Started);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.registry.is_running("a").await);

    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(30)).await);
}
