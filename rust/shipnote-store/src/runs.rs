//! Run records: open, complete (idempotently), and query

use chrono::{DateTime, Utc};
use shipnote_core::entry::MonitoringEntry;
use shipnote_core::run::{RunOutcome, RunRecord, RunStatus, TriggerType};
use shipnote_core::{EntryId, RunId};

use crate::error::StoreResult;
use crate::{must_get, put_doc, update_doc};

/// Result of a completion attempt
#[derive(Debug, Clone)]
pub enum Completion {
    /// This call wrote the terminal fields
    Applied(RunRecord),
    /// The run was already closed; the stored record is returned unchanged
    AlreadyCompleted(RunRecord),
}

impl Completion {
    pub fn record(&self) -> &RunRecord {
        match self {
            Completion::Applied(r) | Completion::AlreadyCompleted(r) => r,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Completion::Applied(_))
    }
}

impl crate::Store {
    /// Open a run in the started state.
    pub fn create_run(
        &self,
        entry: &MonitoringEntry,
        trigger: TriggerType,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<RunRecord> {
        let run = RunRecord::opened(entry, trigger, scheduled_for, now);
        put_doc(&self.runs, &run.id.to_string(), &run)?;
        self.runs_by_entry.insert(
            history_key(entry.id, now, run.id).as_bytes(),
            run.id.to_string().as_bytes(),
        )?;
        Ok(run)
    }

    pub fn get_run(&self, id: RunId) -> StoreResult<RunRecord> {
        must_get(&self.runs, &id.to_string(), "run")
    }

    /// Write the terminal fields exactly once. A second completion of the
    /// same run is a no-op that reports the stored record.
    pub fn complete_run(
        &self,
        id: RunId,
        outcome: RunOutcome,
        now: DateTime<Utc>,
    ) -> StoreResult<Completion> {
        let mut applied = false;
        let record = update_doc(&self.runs, &id.to_string(), "run", |run: &mut RunRecord| {
            applied = run.is_open();
            if !applied {
                return Ok(());
            }
            run.status = RunStatus::Completed;
            run.completed_at = Some(now);
            run.window_from = outcome.window_from;
            run.window_to = outcome.window_to;
            run.pr_stats = outcome.pr_stats.clone();
            run.has_activity = outcome.has_activity;
            run.summary = outcome.summary.clone();
            run.note_snapshot = outcome.note_snapshot.clone();
            run.delivery = Some(outcome.delivery.clone());
            Ok(())
        })?;
        Ok(if applied {
            Completion::Applied(record)
        } else {
            Completion::AlreadyCompleted(record)
        })
    }

    /// Run history for one entry, most recent first.
    pub fn list_runs_for_entry(&self, entry_id: EntryId, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let prefix = format!("{}/", entry_id);
        let mut runs = Vec::new();
        for item in self.runs_by_entry.scan_prefix(prefix.as_bytes()).rev() {
            let (_, run_id) = item?;
            let run: RunRecord = must_get(&self.runs, &String::from_utf8_lossy(&run_id), "run")?;
            runs.push(run);
            if runs.len() >= limit {
                break;
            }
        }
        Ok(runs)
    }

    /// Runs still open past the grace cutoff; the reaper's input.
    pub fn list_open_runs_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<RunRecord>> {
        let mut stale = Vec::new();
        for item in self.runs.iter() {
            let (_, bytes) = item?;
            let run: RunRecord = serde_json::from_slice(&bytes)?;
            if run.is_open() && run.started_at < cutoff {
                stale.push(run);
            }
        }
        stale.sort_by_key(|r| r.started_at);
        Ok(stale)
    }
}

/// Key shape keeps one entry's runs contiguous and time-ordered.
fn history_key(entry_id: EntryId, started_at: DateTime<Utc>, run_id: RunId) -> String {
    format!(
        "{}/{:020}/{}",
        entry_id,
        started_at.timestamp_millis().max(0),
        run_id
    )
}
