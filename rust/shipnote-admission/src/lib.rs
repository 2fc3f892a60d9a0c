//! Quota gate
//!
//! Admission checks compare a tenant's usage snapshot against its plan
//! snapshot. Admission is optimistic: `consume` checks, then increments
//! atomically; under a race the increment wins and the overshoot stays
//! visible in the counter. `release` decrements, floored at zero.
//!
//! The email counter is monthly: the period rolls over lazily whenever a
//! check observes that a calendar month has elapsed since
//! `usage_period_start`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shipnote_core::tenant::Tenant;
use shipnote_core::TenantId;
use shipnote_store::{Store, StoreError, UsageField};
use thiserror::Error;

/// Which plan limit an admission request is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Repo,
    Author,
    Email,
}

impl QuotaKind {
    fn usage_field(self) -> UsageField {
        match self {
            QuotaKind::Repo => UsageField::Repos,
            QuotaKind::Author => UsageField::Authors,
            QuotaKind::Email => UsageField::EmailsSent,
        }
    }

    fn usage(self, tenant: &Tenant) -> u32 {
        match self {
            QuotaKind::Repo => tenant.usage.repos_count,
            QuotaKind::Author => tenant.usage.authors_count,
            QuotaKind::Email => tenant.usage.emails_sent_this_month,
        }
    }

    fn limit(self, tenant: &Tenant) -> u32 {
        match self {
            QuotaKind::Repo => tenant.plan.max_repos,
            QuotaKind::Author => tenant.plan.max_authors,
            QuotaKind::Email => tenant.plan.max_emails_per_month,
        }
    }
}

/// Outcome of a `consume` attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Admission granted; `usage` is the counter after the increment
    Admitted { usage: u32 },
    /// Usage already at or over the limit
    Rejected { usage: u32, limit: u32 },
}

impl QuotaDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, QuotaDecision::Admitted { .. })
    }
}

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct QuotaGate {
    store: Arc<Store>,
}

impl QuotaGate {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// True iff usage is strictly below the limit at `now`.
    pub fn can_consume(
        &self,
        tenant_id: TenantId,
        kind: QuotaKind,
        now: DateTime<Utc>,
    ) -> Result<bool, QuotaError> {
        let tenant = self.store.get_tenant_with_limits(tenant_id, now)?;
        Ok(kind.usage(&tenant) < kind.limit(&tenant))
    }

    /// Check then atomically increment. The check and increment are not
    /// one transaction; concurrent admits may overshoot by their count.
    pub fn consume(
        &self,
        tenant_id: TenantId,
        kind: QuotaKind,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaError> {
        let tenant = self.store.get_tenant_with_limits(tenant_id, now)?;
        let usage = kind.usage(&tenant);
        let limit = kind.limit(&tenant);
        if usage >= limit {
            tracing::debug!(
                tenant_id = %tenant_id,
                ?kind,
                usage,
                limit,
                "quota admission rejected"
            );
            return Ok(QuotaDecision::Rejected { usage, limit });
        }
        let usage = self
            .store
            .increment_usage(tenant_id, kind.usage_field(), 1, now)?;
        Ok(QuotaDecision::Admitted { usage })
    }

    /// Give back one unit on resource removal. Floored at zero.
    pub fn release(
        &self,
        tenant_id: TenantId,
        kind: QuotaKind,
        now: DateTime<Utc>,
    ) -> Result<u32, QuotaError> {
        Ok(self
            .store
            .increment_usage(tenant_id, kind.usage_field(), -1, now)?)
    }
}
