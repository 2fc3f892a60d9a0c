//! Monitoring entries: the central coordination record
//!
//! An entry declares that a tenant wants periodic summaries for one author
//! on one repository. The `(tenant, author, repository)` triple is unique;
//! the store enforces it and reactivates soft-removed entries in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AuthorId, EntryId, RepositoryId, TenantId};
use crate::schedule::ScheduleSpec;

/// Maximum length of the contributor-authored note, in characters.
pub const MAX_NOTE_CHARS: usize = 5000;

/// Whether the monitored author participates or is watched passively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Passively monitored; the author has no account here
    Ghost,
    /// The author accepted an invite and may edit their own note
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Active,
    Paused,
    /// Soft-deleted; kept for historical runs
    Removed,
}

/// How the fetch stage derives its `[from, to]` window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchWindow {
    /// `[last_run_at ?? now - default window, now]`
    SinceLastRun,
    /// A fixed, explicitly configured range
    ExplicitRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub author_id: AuthorId,
    pub repository_id: RepositoryId,
    pub mode: EntryMode,
    pub status: EntryStatus,
    pub schedule: ScheduleSpec,
    pub fetch_window: FetchWindow,
    /// Destination addresses for the summary mail
    pub recipients: Vec<String>,
    /// Contributor-authored free text, snapshotted into each run
    pub note: Option<String>,
    /// Completion instant of the most recent run
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next scheduled firing; None retires the entry from the due query
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoringEntry {
    pub fn new(
        tenant_id: TenantId,
        author_id: AuthorId,
        repository_id: RepositoryId,
        schedule: ScheduleSpec,
        recipients: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            tenant_id,
            author_id,
            repository_id,
            mode: EntryMode::Ghost,
            status: EntryStatus::Active,
            schedule,
            fetch_window: FetchWindow::SinceLastRun,
            recipients,
            note: None,
            last_run_at: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the tick loop should consider this entry at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Active
            && self.schedule.is_active
            && matches!(self.next_run_at, Some(at) if at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleSpec;
    use chrono::{NaiveTime, TimeZone};

    fn entry_at(next_run_at: Option<DateTime<Utc>>) -> MonitoringEntry {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut entry = MonitoringEntry::new(
            TenantId::new(),
            AuthorId::new(),
            RepositoryId::new(),
            ScheduleSpec::daily(NaiveTime::from_hms_opt(9, 0, 0).unwrap(), "UTC"),
            vec!["a@example.com".to_string()],
            now,
        );
        entry.next_run_at = next_run_at;
        entry
    }

    #[test]
    fn due_requires_active_status_and_schedule() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let mut entry = entry_at(Some(now));
        assert!(entry.is_due(now));

        entry.status = EntryStatus::Paused;
        assert!(!entry.is_due(now));

        entry.status = EntryStatus::Active;
        entry.schedule.is_active = false;
        assert!(!entry.is_due(now));
    }

    #[test]
    fn null_next_run_never_due() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        assert!(!entry_at(None).is_due(now));
    }
}
