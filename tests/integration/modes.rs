//! Trading modes driven end to end through the registry.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use volumebot::engine::controller::Controller;
use volumebot::engine::modes::bump::BumpMode;
use volumebot::engine::modes::human::{HumanMode, WalletState, MAX_CONSECUTIVE_BUYS};
use volumebot::engine::modes::{CycleBounds, CycleContext, CycleStrategy, Session, PROBE_BUY_SOL};
use volumebot::types::*;
use volumebot::wallet::{KeyVault, SigningKey};

use crate::mocks::{account, fast_timing, Harness, TOKEN_MINT};

async fn run_for(h: &Harness, id: &str, secs: u64) {
    h.registry.start(id).await;
    tokio::time::sleep(Duration::from_secs(secs)).await;
    h.registry.stop(id).await;
    assert!(h.registry.drain(Duration::from_secs(120)).await);
}

fn confirmed(h: &Harness) -> Vec<TxLogEntry> {
    h.ledger.with_status(TxStatus::Confirmed)
}

#[tokio::test(start_paused = true)]
async fn test_human_mode_never_exceeds_consecutive_buys() {
    let h = Harness::new(vec![account("a", TradingMode::Human)], false);
    h.vault.set("a", &["W1", "W2", "W3", "W4"]);

    run_for(&h, "a", 1_800).await;

    let entries = confirmed(&h);
    assert!(entries.iter().any(|e| e.action == SwapAction::Buy));
    assert!(entries.iter().any(|e| e.action == SwapAction::Sell));

    let mut streaks: HashMap<String, u32> = HashMap::new();
    for entry in &entries {
        let streak = streaks.entry(entry.wallet.clone()).or_default();
        match entry.action {
            SwapAction::Buy => {
                *streak += 1;
                assert!(
                    *streak <= MAX_CONSECUTIVE_BUYS,
                    "{} bought {} times in a row",
                    entry.wallet,
                    streak
                );
            }
            SwapAction::Sell => *streak = 0,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_pure_mode_probes_then_sells_chain_balance() {
    let h = Harness::new(vec![account("a", TradingMode::Pure)], false);
    h.vault.set("a", &["W1"]);
    h.chain.set_tokens("W1", 3_000_000);

    run_for(&h, "a", 20).await;

    let entries = confirmed(&h);
    let buys: Vec<&TxLogEntry> = entries.iter().filter(|e| e.action == SwapAction::Buy).collect();
    assert!(!buys.is_empty());
    assert_eq!(buys[0].input_amount, PROBE_BUY_SOL);
    assert!(buys[1..].iter().all(|b| b.input_amount >= dec!(0.01)));

    let sells: Vec<&TxLogEntry> = entries.iter().filter(|e| e.action == SwapAction::Sell).collect();
    assert!(!sells.is_empty());
    assert!(sells.iter().all(|s| s.input_amount == dec!(3)));
}

#[tokio::test(start_paused = true)]
async fn test_growth_mode_sells_ninety_percent() {
    let h = Harness::new(vec![account("a", TradingMode::Growth)], false);
    h.vault.set("a", &["W1"]);

    run_for(&h, "a", 20).await;

    let entries = confirmed(&h);
    let mut pending: Option<Decimal> = None;
    let mut checked = 0;
    for entry in &entries {
        match entry.action {
            SwapAction::Buy => pending = Some(entry.output_amount),
            SwapAction::Sell => {
                let bought = pending.take().expect("sell follows a buy");
                // truncated to token decimals on the way to raw units
                let target = bought * dec!(0.9);
                assert!(entry.input_amount <= target);
                assert!(target - entry.input_amount < dec!(0.000001));
                checked += 1;
            }
        }
    }
    assert!(checked > 0);
}

#[tokio::test(start_paused = true)]
async fn test_moonshot_mode_only_buys() {
    let h = Harness::new(vec![account("a", TradingMode::Moonshot)], false);
    h.vault.set("a", &["W1", "W2"]);

    run_for(&h, "a", 30).await;

    let entries = confirmed(&h);
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.action == SwapAction::Buy));
    assert!(entries.iter().all(|e| e.output_mint == TOKEN_MINT));
}

#[tokio::test(start_paused = true)]
async fn test_bump_mode_sells_what_it_bought() {
    let h = Harness::new(vec![account("a", TradingMode::Bump)], false);
    h.vault.set("a", &["W1"]);

    run_for(&h, "a", 20).await;

    let entries = confirmed(&h);
    let pairs: Vec<_> = entries.chunks(2).filter(|c| c.len() == 2).collect();
    assert!(!pairs.is_empty());
    for pair in pairs {
        assert_eq!(pair[0].action, SwapAction::Buy);
        assert_eq!(pair[1].action, SwapAction::Sell);
        assert_eq!(pair[1].input_amount, pair[0].output_amount);
    }
}

#[tokio::test(start_paused = true)]
async fn test_mode_switch_takes_effect_next_cycle() {
    let h = Harness::new(vec![account("a", TradingMode::Moonshot)], false);
    h.vault.set("a", &["W1"]);
    h.registry.start("a").await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let mut acc = h.store.get("a").unwrap();
    acc.trading.mode = TradingMode::Bump;
    volumebot::storage::AccountStore::save(h.store.as_ref(), &acc)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    h.registry.stop("a").await;
    assert!(h.registry.drain(Duration::from_secs(60)).await);

    let entries = confirmed(&h);
    assert!(entries.iter().any(|e| e.mode == TradingMode::Moonshot));
    assert!(entries
        .iter()
        .any(|e| e.mode == TradingMode::Bump && e.action == SwapAction::Sell));
}

async fn wallets(h: &Harness, acc: &Account, addresses: &[&str]) -> Vec<Arc<dyn SigningKey>> {
    h.vault.set(&acc.id, addresses);
    h.vault.resolve_signing_keys(acc).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_bump_mode_waits_before_selling() {
    let mut acc = account("a", TradingMode::Bump);
    acc.trading.min_delay_ms = 1_500;
    acc.trading.max_delay_ms = 1_500;
    let h = Harness::new(vec![acc.clone()], false);
    let wallets = wallets(&h, &acc, &["W1"]).await;
    let controller = Controller::new("a", 1);
    let timing = fast_timing();
    let mut session = Session::new(StdRng::seed_from_u64(7));
    let mut ctx = CycleContext {
        controller: &controller,
        account: &acc,
        wallets: &wallets,
        bounds: CycleBounds::from_config(&acc.trading),
        executor: &h.executor,
        chain: &*h.chain,
        timing: &timing,
        session: &mut session,
    };

    let start = Instant::now();
    let outcome = BumpMode.run_cycle(&mut ctx).await;

    assert_eq!(outcome.successes, 2);
    // one pause between buy and sell, one after the pair
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_liquidating_patterns_leave_no_holdings() {
    let acc = account("a", TradingMode::Human);
    let h = Harness::new(vec![acc.clone()], false);
    let wallets = wallets(&h, &acc, &["W1", "W2", "W3"]).await;
    let timing = fast_timing();

    for pattern in [1u8, 2] {
        for seed in 0..40u64 {
            let controller = Controller::new("a", 1);
            let mut session = Session::new(StdRng::seed_from_u64(seed));
            let mut human = HumanMode::default();
            let mut ctx = CycleContext {
                controller: &controller,
                account: &acc,
                wallets: &wallets,
                bounds: CycleBounds::from_config(&acc.trading),
                executor: &h.executor,
                chain: &*h.chain,
                timing: &timing,
                session: &mut session,
            };
            human.run_pattern(pattern, &mut ctx).await;

            for wallet in &wallets {
                assert_eq!(
                    human.tracker().state(wallet.address()),
                    WalletState::Idle,
                    "pattern {pattern} seed {seed} left {} holding",
                    wallet.address()
                );
            }
        }
    }
}
