//! Swap executor, settlement and fee collection against the mock chain.

use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::time::Instant;

use volumebot::engine::controller::{rate_limit_backoff, Controller};
use volumebot::types::*;
use volumebot::wallet::{KeyVault, SigningKey};

use crate::mocks::{account, Harness, TOKEN_MINT};

async fn first_wallet(h: &Harness, acc: &Account) -> std::sync::Arc<dyn SigningKey> {
    h.vault.set(&acc.id, &["W1"]);
    h.vault.resolve_signing_keys(acc).await.unwrap().remove(0)
}

#[test]
fn test_rate_limit_backoff_sequence() {
    let secs: Vec<u64> = (1..=5).map(|hits| rate_limit_backoff(hits).as_secs()).collect();
    assert_eq!(secs, vec![4, 8, 16, 30, 30]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_back_off_then_succeed() {
    let acc = account("a", TradingMode::Bump);
    let h = Harness::new(vec![acc.clone()], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);
    h.provider.script(vec![
        SwapError::RateLimited("429".to_string()),
        SwapError::RateLimited("429".to_string()),
    ]);

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(0.01), TradingMode::Bump);
    let start = Instant::now();
    let result = h.executor.execute(&controller, &acc, wallet.as_ref(), &intent).await;

    assert!(result.is_some());
    // 4s then 8s backoff windows
    assert!(start.elapsed() >= Duration::from_secs(12));
    assert_eq!(h.provider.quote_count(), 3);
    assert_eq!(controller.rate_limit_hits(), 0);
    assert_eq!(h.ledger.with_status(TxStatus::Failed).len(), 2);
    assert_eq!(h.ledger.with_status(TxStatus::Confirmed).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unrecoverable_aborts_immediately() {
    let acc = account("a", TradingMode::Bump);
    let h = Harness::new(vec![acc.clone()], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);
    h.provider
        .script(vec![SwapError::Unrecoverable("slippage tolerance exceeded".to_string())]);

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(0.01), TradingMode::Bump);
    assert!(h.executor.execute(&controller, &acc, wallet.as_ref(), &intent).await.is_none());

    assert_eq!(h.provider.quote_count(), 1);
    let failed = h.ledger.with_status(TxStatus::Failed);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("slippage"));
    assert_eq!(h.store.get("a").unwrap().cumulative_volume, dec!(0));
}

#[tokio::test(start_paused = true)]
async fn test_transient_retries_are_bounded() {
    let acc = account("a", TradingMode::Bump);
    let h = Harness::new(vec![acc.clone()], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);
    h.provider.fail_always(SwapError::Transient("connection reset".to_string()));

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(0.01), TradingMode::Bump);
    let start = Instant::now();
    assert!(h.executor.execute(&controller, &acc, wallet.as_ref(), &intent).await.is_none());

    assert_eq!(h.provider.quote_count(), 3);
    assert!(start.elapsed() >= Duration::from_millis(1_200));
    assert_eq!(h.ledger.with_status(TxStatus::Failed).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_drops_pending_intent() {
    let acc = account("a", TradingMode::Bump);
    let h = Harness::new(vec![acc.clone()], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);
    controller.request_stop();

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(0.01), TradingMode::Bump);
    assert!(h.executor.execute(&controller, &acc, wallet.as_ref(), &intent).await.is_none());
    assert_eq!(h.provider.quote_count(), 0);
    assert!(h.ledger.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_live_buy_collects_fee_and_records_volume() {
    let acc = account("a", TradingMode::Bump);
    let h = Harness::new(vec![acc.clone()], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(0.01), TradingMode::Bump);
    let result = h
        .executor
        .execute(&controller, &acc, wallet.as_ref(), &intent)
        .await
        .expect("swap settles");

    assert_eq!(result.input_raw, 10_000_000);
    assert_eq!(result.output_raw, 1_000_000);
    assert_eq!(result.output_amount, dec!(1));
    assert_eq!(result.volume_sol, dec!(0.01));
    assert_eq!(result.fee_tx_id.as_deref(), Some("fee-tx-1"));

    // 10 bps of 0.01 SOL, no referrers: all to the platform
    let sent = h.chain.transfers.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![vec![Transfer { to: "PlatformWallet".to_string(), lamports: 10_000 }]]
    );
    assert_eq!(h.store.get("a").unwrap().cumulative_volume, dec!(0.01));

    let confirmed = h.ledger.with_status(TxStatus::Confirmed);
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].fee_tx_id.as_deref(), Some("fee-tx-1"));
}

#[tokio::test(start_paused = true)]
async fn test_sell_counts_native_output_as_volume() {
    let acc = account("a", TradingMode::Bump);
    let h = Harness::new(vec![acc.clone()], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);

    let intent = SwapIntent::sell("W1", TOKEN_MINT, dec!(2), TradingMode::Bump);
    let result = h
        .executor
        .execute(&controller, &acc, wallet.as_ref(), &intent)
        .await
        .expect("swap settles");

    assert_eq!(result.input_raw, 2_000_000);
    assert_eq!(result.volume_sol, dec!(0.02));
    assert_eq!(h.store.get("a").unwrap().cumulative_volume, dec!(0.02));
}

#[tokio::test(start_paused = true)]
async fn test_referrers_are_credited() {
    let mut acc = account("a", TradingMode::Bump);
    acc.referrer_id = Some("ref".to_string());
    let mut referrer = account("ref", TradingMode::Bump);
    referrer.tier = Tier::Gold;
    let h = Harness::new(vec![acc.clone(), referrer], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(1), TradingMode::Bump);
    h.executor
        .execute(&controller, &acc, wallet.as_ref(), &intent)
        .await
        .expect("swap settles");

    let sent = h.chain.transfers.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let pool_leg = sent[0]
        .iter()
        .find(|t| t.to == "RewardsPool")
        .expect("referral leg");
    let earned = h.store.get("ref").unwrap().earned_rewards_lamports;
    assert!(earned > 0);
    assert_eq!(earned, pool_leg.lamports);
}

#[tokio::test(start_paused = true)]
async fn test_volume_crossing_threshold_promotes_tier() {
    let mut acc = account("a", TradingMode::Bump);
    acc.cumulative_volume = dec!(99.99);
    let h = Harness::new(vec![acc.clone()], true);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(0.02), TradingMode::Bump);
    h.executor
        .execute(&controller, &acc, wallet.as_ref(), &intent)
        .await
        .expect("dry run settles");

    let stored = h.store.get("a").unwrap();
    assert_eq!(stored.cumulative_volume, dec!(100.01));
    assert_eq!(stored.tier, Tier::Bronze);
}

#[tokio::test(start_paused = true)]
async fn test_operator_hint_fires_once_per_streak() {
    let acc = account("a", TradingMode::Bump);
    let h = Harness::new(vec![acc.clone()], false);
    let wallet = first_wallet(&h, &acc).await;
    let controller = Controller::new("a", 1);
    h.provider
        .script((0..4).map(|_| SwapError::RateLimited("429".to_string())).collect());

    let intent = SwapIntent::buy("W1", TOKEN_MINT, dec!(0.01), TradingMode::Bump);
    assert!(h.executor.execute(&controller, &acc, wallet.as_ref(), &intent).await.is_none());
    assert_eq!(controller.rate_limit_hits(), 3);
    assert_eq!(controller.status().rate_limit.operator_hints, 1);

    // fourth hit, then success
    assert!(h.executor.execute(&controller, &acc, wallet.as_ref(), &intent).await.is_some());
    let status = controller.status();
    assert_eq!(status.rate_limit.hits, 0);
    assert_eq!(status.rate_limit.operator_hints, 1);
    assert_eq!(h.provider.quote_count(), 5);
}
