//! Run pipeline hooks
//!
//! The surface the API layer drives the engine through: quota-gated
//! onboarding writes (repositories and monitoring entries consume plan
//! slots on create and hand them back on removal), manual run triggers
//! (the id comes back immediately, the pipeline runs on the executor's
//! worker), the due list, and committing a run produced by an external
//! worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shipnote_admission::{QuotaDecision, QuotaGate, QuotaKind};
use shipnote_core::entry::{EntryStatus, MonitoringEntry};
use shipnote_core::repository::{Repository, RepositoryStatus};
use shipnote_core::run::{RunOutcome, RunRecord, TriggerType};
use shipnote_core::{EntryId, RepositoryId, RunId, TenantId};
use shipnote_schedule::next_firing;
use shipnote_store::{Completion, NewEntry, Store, StoreResult};

use crate::executor::RunExecutor;
use crate::EngineError;

pub struct PipelineHooks {
    store: Arc<Store>,
    executor: Arc<RunExecutor>,
    quota: QuotaGate,
}

impl PipelineHooks {
    pub fn new(store: Arc<Store>, executor: Arc<RunExecutor>, quota: QuotaGate) -> Self {
        Self {
            store,
            executor,
            quota,
        }
    }

    /// Register a repository under the tenant's repo quota. The slot is
    /// consumed before the write and handed back if the write fails.
    pub fn register_repository(
        &self,
        tenant_id: TenantId,
        owner: &str,
        name: &str,
        credential: Option<&str>,
    ) -> Result<Repository, EngineError> {
        let now = Utc::now();
        self.admit(tenant_id, QuotaKind::Repo, now)?;
        match self
            .store
            .create_repository(tenant_id, owner, name, credential, now)
        {
            Ok(repo) => Ok(repo),
            Err(e) => {
                self.return_slot(tenant_id, QuotaKind::Repo, now);
                Err(e.into())
            }
        }
    }

    /// Soft-delete a repository: dependent entries pause, the repo-quota
    /// slot is released. Removing an already-removed repository is a
    /// no-op so the slot cannot be released twice.
    pub fn remove_repository(&self, repository_id: RepositoryId) -> Result<(), EngineError> {
        let now = Utc::now();
        let repo = self.store.get_repository(repository_id)?;
        if repo.status == RepositoryStatus::Removed {
            return Ok(());
        }
        self.store.remove_repository(repository_id, now)?;
        self.quota.release(repo.tenant_id, QuotaKind::Repo, now)?;
        Ok(())
    }

    /// Create a monitoring entry under the tenant's author quota: each
    /// entry designates one author of interest on one repository.
    /// Re-adding a soft-removed entry reactivates it in place and counts
    /// against the quota again, since removal released its slot.
    pub fn register_entry(&self, new: NewEntry) -> Result<MonitoringEntry, EngineError> {
        let now = Utc::now();
        let tenant_id = new.tenant_id;
        self.admit(tenant_id, QuotaKind::Author, now)?;
        match self.store.create_entry(new, now) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.return_slot(tenant_id, QuotaKind::Author, now);
                Err(e.into())
            }
        }
    }

    /// Soft-delete a monitoring entry and release its author-quota slot.
    pub fn remove_entry(&self, entry_id: EntryId) -> Result<MonitoringEntry, EngineError> {
        let now = Utc::now();
        let entry = self.store.get_entry(entry_id)?;
        if entry.status == EntryStatus::Removed {
            return Ok(entry);
        }
        let entry = self
            .store
            .set_entry_status(entry_id, EntryStatus::Removed, now)?;
        self.quota.release(entry.tenant_id, QuotaKind::Author, now)?;
        Ok(entry)
    }

    /// Open a manual run and return its id at once; the caller polls the
    /// run record for completion. The pipeline itself executes on the
    /// executor's worker behind any run already in flight.
    pub fn trigger_now(
        &self,
        entry_id: EntryId,
        window_override: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<RunId, EngineError> {
        let entry = self.store.get_entry(entry_id)?;
        let now = Utc::now();
        let run = self
            .store
            .create_run(&entry, TriggerType::Manual, None, now)?;
        let run_id = run.id;

        let executor = self.executor.clone();
        tokio::spawn(async move {
            if let Err(e) = executor
                .execute_opened(&entry, run, window_override, Utc::now())
                .await
            {
                tracing::error!(run_id = %run_id, error = %e, "manual run failed");
            }
        });
        Ok(run_id)
    }

    /// The same due list the tick loop consumes, for an external worker.
    pub fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<MonitoringEntry>> {
        self.store.list_due_entries(now)
    }

    /// Commit a run executed out-of-process. The run must still be open;
    /// terminal fields are written exactly once and the entry's schedule
    /// is advanced like any in-process run.
    pub fn complete_run(
        &self,
        run_id: RunId,
        outcome: RunOutcome,
        now: DateTime<Utc>,
    ) -> Result<RunRecord, EngineError> {
        match self.store.complete_run(run_id, outcome, now)? {
            Completion::Applied(record) => {
                let entry = self.store.get_entry(record.entry_id)?;
                let next = next_firing(&entry.schedule, now);
                self.store.advance_schedule(entry.id, now, next)?;
                Ok(record)
            }
            Completion::AlreadyCompleted(_) => Err(EngineError::RunAlreadyCompleted(run_id)),
        }
    }

    fn admit(
        &self,
        tenant_id: TenantId,
        kind: QuotaKind,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        match self.quota.consume(tenant_id, kind, now)? {
            QuotaDecision::Admitted { .. } => Ok(()),
            QuotaDecision::Rejected { usage, limit } => {
                Err(EngineError::QuotaExceeded { kind, usage, limit })
            }
        }
    }

    /// Hand an admitted unit back after a write that never happened.
    fn return_slot(&self, tenant_id: TenantId, kind: QuotaKind, now: DateTime<Utc>) {
        if let Err(e) = self.quota.release(tenant_id, kind, now) {
            tracing::error!(tenant_id = %tenant_id, ?kind, error = %e, "quota release failed");
        }
    }
}
