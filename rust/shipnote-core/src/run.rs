//! Run records: one immutable document per attempted execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AuthorId, EntryId, RepositoryId, RunId, TenantId};

/// Why a run was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Scheduled,
    Manual,
}

/// Run lifecycle. A run is mutable only while `Started`; `complete_run`
/// writes the terminal fields exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Completed,
}

/// Terminal state of the email send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    /// SMTP / transport error
    Failed,
    /// No activity, missing recipients, summary failure, or quota reached
    Skipped,
}

/// Delivery outcome recorded inside the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub status: DeliveryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub recipients: Vec<String>,
    pub failure_reason: Option<String>,
}

impl DeliveryRecord {
    pub fn sent(recipients: Vec<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: DeliveryStatus::Sent,
            sent_at: Some(at),
            recipients,
            failure_reason: None,
        }
    }

    pub fn failed(recipients: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            sent_at: None,
            recipients,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Skipped,
            sent_at: None,
            recipients: Vec::new(),
            failure_reason: Some(reason.into()),
        }
    }
}

/// Pull-request counts captured by the fetch stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrStats {
    pub count: u32,
    /// Host-side PR numbers, in the order fetched
    pub numbers: Vec<u64>,
}

/// Terminal fields written by `complete_run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub window_from: Option<DateTime<Utc>>,
    pub window_to: Option<DateTime<Utc>>,
    pub pr_stats: PrStats,
    pub has_activity: bool,
    /// LLM-produced email body, None when skipped or failed
    pub summary: Option<String>,
    /// Entry note at execution time
    pub note_snapshot: Option<String>,
    pub delivery: DeliveryRecord,
}

impl RunOutcome {
    /// Outcome for a run that never produced a usable window or bundle.
    pub fn aborted(delivery: DeliveryRecord) -> Self {
        Self {
            window_from: None,
            window_to: None,
            pr_stats: PrStats::default(),
            has_activity: false,
            summary: None,
            note_snapshot: None,
            delivery,
        }
    }
}

/// One attempted execution of a monitoring entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub entry_id: EntryId,
    pub tenant_id: TenantId,
    pub author_id: AuthorId,
    pub repository_id: RepositoryId,
    pub trigger: TriggerType,
    /// The firing instant this run was scheduled for, if any
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub window_from: Option<DateTime<Utc>>,
    pub window_to: Option<DateTime<Utc>>,
    pub pr_stats: PrStats,
    pub has_activity: bool,
    pub summary: Option<String>,
    pub note_snapshot: Option<String>,
    /// Present once the run is closed; terminal by then
    pub delivery: Option<DeliveryRecord>,
}

impl RunRecord {
    pub fn opened(
        entry: &crate::entry::MonitoringEntry,
        trigger: TriggerType,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunId::new(),
            entry_id: entry.id,
            tenant_id: entry.tenant_id,
            author_id: entry.author_id,
            repository_id: entry.repository_id,
            trigger,
            scheduled_for,
            started_at: now,
            completed_at: None,
            status: RunStatus::Started,
            window_from: None,
            window_to: None,
            pr_stats: PrStats::default(),
            has_activity: false,
            summary: None,
            note_snapshot: None,
            delivery: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RunStatus::Started
    }
}
