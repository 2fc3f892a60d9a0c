//! Domain records for the shipnote run engine
//!
//! Persisted shapes (tenants, repositories, authors, monitoring entries,
//! runs) and the run-failure taxonomy. All identifiers are opaque UUIDs;
//! services act on ids, never on cross-record references.

pub mod entry;
pub mod failure;
pub mod ids;
pub mod repository;
pub mod run;
pub mod schedule;
pub mod tenant;

pub use entry::{EntryMode, EntryStatus, FetchWindow, MonitoringEntry, MAX_NOTE_CHARS};
pub use failure::{reason, RunFailure};
pub use ids::{AuthorId, EntryId, RepositoryId, RunId, TenantId};
pub use repository::{Author, Repository, RepositoryStatus};
pub use run::{
    DeliveryRecord, DeliveryStatus, PrStats, RunOutcome, RunRecord, RunStatus, TriggerType,
};
pub use schedule::{ScheduleKind, ScheduleSpec, Weekday};
pub use tenant::{PlanSnapshot, SubscriptionState, Tenant, UsageSnapshot};
