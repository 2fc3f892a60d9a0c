//! Abandoned-run reaper
//!
//! A crash between `create_run` and `complete_run` leaves a run in the
//! started state forever. The reaper sweeps at startup and then hourly,
//! converting runs older than the executor grace window into
//! failed/"abandoned" and recomputing their entries' next firing so the
//! schedule keeps moving.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shipnote_core::run::{DeliveryRecord, RunOutcome};
use shipnote_core::reason;
use shipnote_schedule::next_firing;
use shipnote_store::{Store, StoreResult};
use tokio::sync::watch;

pub struct Reaper {
    store: Arc<Store>,
    /// Runs open longer than this are considered abandoned
    grace: Duration,
    /// Interval between sweeps
    period: Duration,
}

impl Reaper {
    pub fn new(store: Arc<Store>, grace: Duration, period: Duration) -> Self {
        Self {
            store,
            grace,
            period,
        }
    }

    /// Close every stale open run and advance its entry. Returns the
    /// number of runs reaped.
    pub fn sweep(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let grace = chrono::Duration::from_std(self.grace)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let stale = self.store.list_open_runs_started_before(now - grace)?;
        let mut reaped = 0;

        for run in stale {
            let outcome = RunOutcome::aborted(DeliveryRecord::failed(vec![], reason::ABANDONED));
            let completion = self.store.complete_run(run.id, outcome, now)?;
            if !completion.was_applied() {
                continue;
            }
            reaped += 1;
            tracing::warn!(
                run_id = %run.id,
                entry_id = %run.entry_id,
                started_at = %run.started_at,
                "reaped abandoned run"
            );

            match self.store.get_entry(run.entry_id) {
                Ok(entry) => {
                    let next = next_firing(&entry.schedule, now);
                    self.store
                        .advance_schedule(entry.id, run.started_at, next)?;
                }
                Err(e) => {
                    tracing::error!(entry_id = %run.entry_id, error = %e, "entry lookup failed during reap");
                }
            }
        }
        Ok(reaped)
    }

    /// Startup sweep, then periodic sweeps until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        match self.sweep(Utc::now()) {
            Ok(0) => {}
            Ok(n) => tracing::info!(reaped = n, "startup sweep closed abandoned runs"),
            Err(e) => tracing::error!(error = %e, "startup sweep failed"),
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.sweep(Utc::now()) {
                tracing::error!(error = %e, "reaper sweep failed");
            }
        }
    }
}
