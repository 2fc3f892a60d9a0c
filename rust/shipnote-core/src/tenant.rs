//! Tenant records: subscription state, plan snapshot, usage counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TenantId;

/// Subscription lifecycle as reported by the billing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

/// Limits copied onto the tenant at subscription time.
///
/// Plans are versioned by identity: once a snapshot is written it is only
/// replaced wholesale by a billing update, never edited field-by-field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Named tier this snapshot was taken from
    pub plan: String,
    pub max_repos: u32,
    pub max_authors: u32,
    pub max_emails_per_month: u32,
}

impl PlanSnapshot {
    /// Free-tier defaults applied at onboarding before any billing event.
    pub fn free() -> Self {
        Self {
            plan: "free".to_string(),
            max_repos: 1,
            max_authors: 2,
            max_emails_per_month: 50,
        }
    }
}

/// Current resource consumption within the billing period.
///
/// Counters are non-negative and only move through atomic store updates;
/// `emails_sent_this_month` resets when the period rolls over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub repos_count: u32,
    pub authors_count: u32,
    pub emails_sent_this_month: u32,
    /// Start of the current monthly usage period
    pub usage_period_start: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn starting_at(period_start: DateTime<Utc>) -> Self {
        Self {
            repos_count: 0,
            authors_count: 0,
            emails_sent_this_month: 0,
            usage_period_start: period_start,
        }
    }
}

/// One subscribed organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    /// Display name shown in outbound mail and the API
    pub name: String,
    /// Opaque principal of the owning identity, resolved by the auth layer
    pub owner: String,
    pub subscription: SubscriptionState,
    pub plan: PlanSnapshot,
    pub usage: UsageSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            owner: owner.into(),
            subscription: SubscriptionState::Trialing,
            plan: PlanSnapshot::free(),
            usage: UsageSnapshot::starting_at(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the monthly usage period containing `usage_period_start`
    /// has elapsed at `now` (one calendar month, clamped for short months).
    pub fn usage_period_expired(&self, now: DateTime<Utc>) -> bool {
        now >= next_period_start(self.usage.usage_period_start)
    }
}

/// First instant of the usage period after the one starting at `start`.
///
/// Adds one calendar month; a day that does not exist in the target month
/// clamps to that month's last day.
pub fn next_period_start(start: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Months;
    start
        .checked_add_months(Months::new(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
