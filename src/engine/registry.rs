//! Controller registry.
//!
//! Maps account ids to live controllers and guarantees at most one loop
//! per account. Every spawned loop carries a generation number; a loop
//! whose generation no longer matches the registry entry exits without
//! touching the entry or the stored running flag.
//!
//! Writes of the persisted `running` flag happen under the registry lock
//! so that start, stop, resume and loop exit are observed in one order.

use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::engine::bot_loop::{BotEngine, BotLoop, ExitReason};
use crate::engine::controller::{Controller, ControllerStatus};
use crate::types::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Started,
    Resumed,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Stopping,
    AlreadyStopping,
    NotRunning,
}

pub struct ControllerRegistry {
    engine: Arc<BotEngine>,
    controllers: Mutex<HashMap<AccountId, Arc<Controller>>>,
    next_generation: AtomicU64,
}

impl ControllerRegistry {
    pub fn new(engine: Arc<BotEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            controllers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        })
    }

    /// Start (or resume) the bot for `account_id`. Idempotent.
    pub async fn start(self: &Arc<Self>, account_id: &str) -> StartStatus {
        let mut controllers = self.controllers.lock().await;

        if let Some(existing) = controllers.get(account_id) {
            if existing.is_stopping() {
                existing.resume();
                self.persist_running(account_id, true).await;
                info!(account_id, generation = existing.generation(), "Bot resumed");
                return StartStatus::Resumed;
            }
            return StartStatus::AlreadyRunning;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let controller = Arc::new(Controller::new(account_id, generation));
        controllers.insert(account_id.to_string(), controller.clone());
        self.persist_running(account_id, true).await;
        drop(controllers);

        tokio::spawn(supervise(self.clone(), controller));
        info!(account_id, generation, "Bot started");
        StartStatus::Started
    }

    /// Ask the bot for `account_id` to stop. The stored running flag is
    /// cleared regardless of whether a controller exists.
    pub async fn stop(&self, account_id: &str) -> StopStatus {
        let controllers = self.controllers.lock().await;

        let status = match controllers.get(account_id) {
            Some(controller) if controller.request_stop() => StopStatus::Stopping,
            Some(_) => StopStatus::AlreadyStopping,
            None => StopStatus::NotRunning,
        };
        self.persist_running(account_id, false).await;

        info!(account_id, ?status, "Stop requested");
        status
    }

    /// `getControllerStatus`: health snapshot of the live controller, if any.
    pub async fn status(&self, account_id: &str) -> Option<ControllerStatus> {
        self.controllers
            .lock()
            .await
            .get(account_id)
            .map(|c| c.status())
    }

    pub async fn list(&self) -> Vec<ControllerStatus> {
        let mut all: Vec<ControllerStatus> = self
            .controllers
            .lock()
            .await
            .values()
            .map(|c| c.status())
            .collect();
        all.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        all
    }

    pub async fn is_running(&self, account_id: &str) -> bool {
        self.controllers.lock().await.contains_key(account_id)
    }

    /// Start every account in `ids`, typically those persisted as running.
    pub async fn start_all(self: &Arc<Self>, ids: &[AccountId]) {
        for id in ids {
            self.start(id).await;
        }
    }

    /// Signal every live controller to stop.
    pub async fn stop_all(&self) {
        let ids: Vec<AccountId> = self.controllers.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop(&id).await;
        }
    }

    /// Wait until no controllers remain, up to `timeout`. True if drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.controllers.lock().await.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Whether `controller` is still the registered owner of its account.
    pub(crate) async fn is_current(&self, controller: &Controller) -> bool {
        self.controllers
            .lock()
            .await
            .get(controller.account_id())
            .is_some_and(|c| c.generation() == controller.generation())
    }

    /// Remove `controller`'s entry and persist running=false.
    ///
    /// Without `force`, a controller whose stop was cancelled by a resume is
    /// kept and `false` is returned so its loop carries on. A controller that
    /// is no longer the registered owner is left alone.
    pub(crate) async fn retire(&self, controller: &Controller, force: bool) -> bool {
        let mut controllers = self.controllers.lock().await;
        let account_id = controller.account_id();

        match controllers.get(account_id) {
            Some(current) if current.generation() == controller.generation() => {
                if !force && !current.is_stopping() {
                    return false;
                }
                self.evict(&mut controllers, controller).await;
                true
            }
            _ => true,
        }
    }

    /// Retire `controller` after its loop read `running = false` from the store.
    ///
    /// The flag is re-read under the lock. If a resume landed after the loop's
    /// read, the controller is kept and `false` is returned so the loop carries on.
    pub(crate) async fn retire_disabled(&self, controller: &Controller) -> bool {
        let mut controllers = self.controllers.lock().await;
        let account_id = controller.account_id();

        match controllers.get(account_id) {
            Some(current) if current.generation() == controller.generation() => {
                if !current.is_stopping() {
                    if let Ok(Some(account)) = self.engine.store.load(account_id).await {
                        if account.running {
                            debug!(account_id, "Running flag restored by a resume, loop continues");
                            return false;
                        }
                    }
                }
                self.evict(&mut controllers, controller).await;
                true
            }
            _ => true,
        }
    }

    async fn evict(&self, controllers: &mut HashMap<AccountId, Arc<Controller>>, controller: &Controller) {
        let account_id = controller.account_id();
        self.persist_running(account_id, false).await;
        controllers.remove(account_id);
        info!(account_id, generation = controller.generation(), "Controller retired");
    }

    async fn persist_running(&self, account_id: &str, running: bool) {
        if let Err(e) = self.engine.store.set_running(account_id, running).await {
            warn!(account_id, running, error = %e, "Failed to persist running flag");
        }
    }
}

/// Run one account's loop and clean up however it ends.
async fn supervise(registry: Arc<ControllerRegistry>, controller: Arc<Controller>) {
    let bot = BotLoop::new(registry.engine.clone(), registry.clone(), controller.clone());

    let reason = match AssertUnwindSafe(bot.run()).catch_unwind().await {
        Ok(reason) => reason,
        Err(_) => {
            error!(account_id = %controller.account_id(), "Bot loop panicked");
            controller.record_error("loop panicked");
            ExitReason::Crashed
        }
    };

    info!(account_id = %controller.account_id(), ?reason, "Bot loop exited");

    if reason != ExitReason::Superseded {
        registry.retire(&controller, true).await;
    }
}
