//! Tenant reads, subscription updates, and atomic usage counters

use chrono::{DateTime, Utc};
use shipnote_core::tenant::{next_period_start, PlanSnapshot, SubscriptionState, Tenant};
use shipnote_core::TenantId;

use crate::error::StoreResult;
use crate::{get_doc, must_get, put_doc, update_doc};

/// Which usage counter an increment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageField {
    Repos,
    Authors,
    EmailsSent,
}

impl crate::Store {
    pub fn create_tenant(
        &self,
        name: impl Into<String>,
        owner: impl Into<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<Tenant> {
        let tenant = Tenant::new(name, owner, now);
        put_doc(&self.tenants, &tenant.id.to_string(), &tenant)?;
        Ok(tenant)
    }

    pub fn get_tenant(&self, id: TenantId) -> StoreResult<Tenant> {
        must_get(&self.tenants, &id.to_string(), "tenant")
    }

    /// Tenant plus plan limits, with the monthly usage period rolled over
    /// lazily if it has elapsed. This is the read path quota checks use.
    pub fn get_tenant_with_limits(&self, id: TenantId, now: DateTime<Utc>) -> StoreResult<Tenant> {
        let key = id.to_string();
        let current: Option<Tenant> = get_doc(&self.tenants, &key)?;
        match current {
            Some(t) if t.usage_period_expired(now) => self.roll_usage_period(id, now),
            Some(t) => Ok(t),
            None => Err(crate::StoreError::not_found("tenant", key)),
        }
    }

    /// Applied by the billing layer's webhook handler.
    pub fn update_tenant_subscription(
        &self,
        id: TenantId,
        state: SubscriptionState,
        plan: PlanSnapshot,
        now: DateTime<Utc>,
    ) -> StoreResult<Tenant> {
        update_doc(&self.tenants, &id.to_string(), "tenant", |t: &mut Tenant| {
            t.subscription = state;
            t.plan = plan.clone();
            t.updated_at = now;
            Ok(())
        })
    }

    /// Atomic counter update, floored at zero. Returns the new value.
    pub fn increment_usage(
        &self,
        id: TenantId,
        field: UsageField,
        delta: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let tenant = update_doc(&self.tenants, &id.to_string(), "tenant", |t: &mut Tenant| {
            let counter = match field {
                UsageField::Repos => &mut t.usage.repos_count,
                UsageField::Authors => &mut t.usage.authors_count,
                UsageField::EmailsSent => &mut t.usage.emails_sent_this_month,
            };
            *counter = (*counter as i64 + delta).max(0) as u32;
            t.updated_at = now;
            Ok(())
        })?;
        Ok(match field {
            UsageField::Repos => tenant.usage.repos_count,
            UsageField::Authors => tenant.usage.authors_count,
            UsageField::EmailsSent => tenant.usage.emails_sent_this_month,
        })
    }

    /// Reset the email counter and advance `usage_period_start` until it
    /// covers `now`. Atomic; concurrent callers converge on one rollover.
    pub fn roll_usage_period(&self, id: TenantId, now: DateTime<Utc>) -> StoreResult<Tenant> {
        update_doc(&self.tenants, &id.to_string(), "tenant", |t: &mut Tenant| {
            while now >= next_period_start(t.usage.usage_period_start) {
                t.usage.usage_period_start = next_period_start(t.usage.usage_period_start);
                t.usage.emails_sent_this_month = 0;
            }
            t.updated_at = now;
            Ok(())
        })
    }
}
