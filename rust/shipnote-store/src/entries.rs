//! Monitoring-entry lifecycle and the due query

use chrono::{DateTime, Utc};
use shipnote_core::entry::{EntryMode, EntryStatus, FetchWindow, MonitoringEntry, MAX_NOTE_CHARS};
use shipnote_core::schedule::ScheduleSpec;
use shipnote_core::{AuthorId, EntryId, RepositoryId, TenantId};

use crate::error::{StoreError, StoreResult};
use crate::{claim_unique, must_get, put_doc, update_doc};

/// Parameters for registering a monitoring entry. `next_run_at` is the
/// first firing instant, computed by the caller from the schedule.
pub struct NewEntry {
    pub tenant_id: TenantId,
    pub author_id: AuthorId,
    pub repository_id: RepositoryId,
    pub schedule: ScheduleSpec,
    pub fetch_window: FetchWindow,
    pub recipients: Vec<String>,
    pub note: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl crate::Store {
    /// Create a monitoring entry, enforcing the unique
    /// `(tenant, author, repository)` triple. Re-adding a soft-removed
    /// entry reactivates it in place with the new configuration.
    pub fn create_entry(&self, new: NewEntry, now: DateTime<Utc>) -> StoreResult<MonitoringEntry> {
        validate_note(new.note.as_deref())?;

        let index_key = triple_key(new.tenant_id, new.author_id, new.repository_id);
        let mut entry = MonitoringEntry::new(
            new.tenant_id,
            new.author_id,
            new.repository_id,
            new.schedule.clone(),
            new.recipients.clone(),
            now,
        );
        entry.fetch_window = new.fetch_window;
        entry.note = new.note.clone();
        entry.next_run_at = new.next_run_at;

        match claim_unique(&self.idx_entry_triple, &index_key, &entry.id.to_string())? {
            None => {
                put_doc(&self.entries, &entry.id.to_string(), &entry)?;
                Ok(entry)
            }
            Some(existing_id) => {
                let existing: MonitoringEntry =
                    must_get(&self.entries, &existing_id, "monitoring entry")?;
                if existing.status != EntryStatus::Removed {
                    return Err(StoreError::Conflict(format!(
                        "monitoring entry already exists for author {} on repository {}",
                        new.author_id, new.repository_id
                    )));
                }
                update_doc(
                    &self.entries,
                    &existing_id,
                    "monitoring entry",
                    |e: &mut MonitoringEntry| {
                        e.status = EntryStatus::Active;
                        e.schedule = new.schedule.clone();
                        e.fetch_window = new.fetch_window;
                        e.recipients = new.recipients.clone();
                        e.note = new.note.clone();
                        e.next_run_at = new.next_run_at;
                        e.updated_at = now;
                        Ok(())
                    },
                )
            }
        }
    }

    pub fn get_entry(&self, id: EntryId) -> StoreResult<MonitoringEntry> {
        must_get(&self.entries, &id.to_string(), "monitoring entry")
    }

    pub fn set_entry_status(
        &self,
        id: EntryId,
        status: EntryStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<MonitoringEntry> {
        update_doc(
            &self.entries,
            &id.to_string(),
            "monitoring entry",
            |e: &mut MonitoringEntry| {
                e.status = status;
                e.updated_at = now;
                Ok(())
            },
        )
    }

    pub fn set_entry_note(
        &self,
        id: EntryId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<MonitoringEntry> {
        validate_note(note.as_deref())?;
        update_doc(
            &self.entries,
            &id.to_string(),
            "monitoring entry",
            |e: &mut MonitoringEntry| {
                e.note = note.clone();
                e.updated_at = now;
                Ok(())
            },
        )
    }

    /// Membership acceptance: the monitored author gains note-editing
    /// rights and the entry flips from ghost to open mode.
    pub fn accept_entry_invite(&self, id: EntryId, now: DateTime<Utc>) -> StoreResult<MonitoringEntry> {
        update_doc(
            &self.entries,
            &id.to_string(),
            "monitoring entry",
            |e: &mut MonitoringEntry| {
                e.mode = EntryMode::Open;
                e.updated_at = now;
                Ok(())
            },
        )
    }

    pub fn update_entry_schedule(
        &self,
        id: EntryId,
        schedule: ScheduleSpec,
        next_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<MonitoringEntry> {
        update_doc(
            &self.entries,
            &id.to_string(),
            "monitoring entry",
            |e: &mut MonitoringEntry| {
                e.schedule = schedule.clone();
                e.next_run_at = next_run_at;
                e.updated_at = now;
                Ok(())
            },
        )
    }

    /// All runnable entries at `now`, ordered by `next_run_at` ascending.
    pub fn list_due_entries(&self, now: DateTime<Utc>) -> StoreResult<Vec<MonitoringEntry>> {
        let mut due = Vec::new();
        for item in self.entries.iter() {
            let (_, bytes) = item?;
            let entry: MonitoringEntry = serde_json::from_slice(&bytes)?;
            if entry.is_due(now) {
                due.push(entry);
            }
        }
        due.sort_by_key(|e| e.next_run_at);
        Ok(due)
    }

    pub fn list_entries_for_repository(
        &self,
        repository_id: RepositoryId,
    ) -> StoreResult<Vec<MonitoringEntry>> {
        let mut matching = Vec::new();
        for item in self.entries.iter() {
            let (_, bytes) = item?;
            let entry: MonitoringEntry = serde_json::from_slice(&bytes)?;
            if entry.repository_id == repository_id {
                matching.push(entry);
            }
        }
        Ok(matching)
    }

    /// The closing write of every run: both schedule timestamps move in a
    /// single document update, so a reader seeing the new `next_run_at`
    /// also sees the `last_run_at` of the completed run.
    pub fn advance_schedule(
        &self,
        id: EntryId,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> StoreResult<MonitoringEntry> {
        update_doc(
            &self.entries,
            &id.to_string(),
            "monitoring entry",
            |e: &mut MonitoringEntry| {
                e.last_run_at = Some(last_run_at);
                e.next_run_at = next_run_at;
                e.updated_at = last_run_at;
                Ok(())
            },
        )
    }
}

fn triple_key(tenant: TenantId, author: AuthorId, repository: RepositoryId) -> String {
    format!("{}:{}:{}", tenant, author, repository)
}

fn validate_note(note: Option<&str>) -> StoreResult<()> {
    if let Some(text) = note {
        if text.chars().count() > MAX_NOTE_CHARS {
            return Err(StoreError::Validation(format!(
                "note exceeds {} characters",
                MAX_NOTE_CHARS
            )));
        }
    }
    Ok(())
}
