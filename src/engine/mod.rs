//! Bot orchestration engine.
//!
//! Pipeline per account: Registry → BotLoop → CycleStrategy → SwapExecutor
//! → SwapSettlement → FeeEngine.

pub mod bot_loop;
pub mod controller;
pub mod decimals;
pub mod executor;
pub mod modes;
pub mod registry;
pub mod settlement;

use std::time::Duration;
use tokio::time::Instant;

use controller::Controller;

/// Granularity at which long sleeps notice a stop request.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Sleep for `total`, waking early if the controller is asked to stop.
/// Returns false when the sleep was cut short by a stop.
pub async fn sleep_unless_stopped(controller: &Controller, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if controller.is_stopping() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(STOP_POLL_INTERVAL)).await;
    }
}
