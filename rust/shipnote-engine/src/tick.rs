//! Tick loop
//!
//! One long-lived task polls for due entries and drives the executor
//! sequentially. A tick runs to completion before the next is scheduled;
//! when a tick's work exceeds the period, the next starts immediately
//! after. Shutdown is cooperative: the loop stops scheduling new runs
//! while an in-progress run is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shipnote_core::run::TriggerType;
use shipnote_store::Store;
use tokio::sync::watch;

use crate::executor::RunExecutor;

pub struct TickLoop {
    store: Arc<Store>,
    executor: Arc<RunExecutor>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl TickLoop {
    pub fn new(
        store: Arc<Store>,
        executor: Arc<RunExecutor>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            executor,
            period,
            shutdown,
        }
    }

    /// Poll until shutdown is signalled.
    pub async fn run(mut self) {
        tracing::info!(period_secs = self.period.as_secs(), "tick loop started");
        loop {
            let tick_started = tokio::time::Instant::now();
            self.tick_once().await;

            let wait = self.period.saturating_sub(tick_started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.changed() => {}
            }
            if *self.shutdown.borrow() {
                tracing::info!("tick loop stopping");
                break;
            }
        }
    }

    /// One poll: discover due entries and execute them in `next_run_at`
    /// order. Returns how many runs were executed.
    pub async fn tick_once(&self) -> usize {
        let now = Utc::now();
        let due = match self.store.list_due_entries(now) {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "due-entry query failed");
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }
        tracing::debug!(count = due.len(), "due entries found");

        let mut executed = 0;
        for entry in due {
            // Stop scheduling new runs once shutdown is requested.
            if *self.shutdown.borrow() {
                tracing::info!("shutdown requested, leaving remaining entries for later");
                break;
            }
            match self
                .executor
                .execute(&entry, TriggerType::Scheduled, None, Utc::now())
                .await
            {
                Ok(run) => {
                    executed += 1;
                    tracing::debug!(entry_id = %entry.id, run_id = %run.id, "run executed");
                }
                Err(e) => {
                    tracing::error!(entry_id = %entry.id, error = %e, "run execution failed");
                }
            }
        }
        executed
    }
}
