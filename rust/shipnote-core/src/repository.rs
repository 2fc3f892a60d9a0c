//! Repository records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RepositoryId, TenantId};

/// Operational status of a monitored repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    Active,
    /// Tenant revoked our access on the host side
    Revoked,
    /// The stored credential was rejected by the host (401/403/404)
    TokenError,
    Paused,
    /// Soft-deleted; kept for historical runs
    Removed,
}

/// A (tenant, owner, name) repository registration.
///
/// `(tenant_id, full_name)` is unique, enforced by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub tenant_id: TenantId,
    pub owner: String,
    pub name: String,
    /// `owner/name`, the host-side addressing form
    pub full_name: String,
    /// Sealed access credential (AEAD ciphertext, hex-encoded); None when
    /// the tenant relies on the process-global token
    pub sealed_credential: Option<String>,
    pub status: RepositoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    pub fn new(
        tenant_id: TenantId,
        owner: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            id: RepositoryId::new(),
            tenant_id,
            full_name: format!("{}/{}", owner, name),
            owner,
            name,
            sealed_credential: None,
            status: RepositoryStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Global registry entry for a code-host user.
///
/// Authors are shared across tenants; `host_user_id` and `username` are
/// each unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: crate::ids::AuthorId,
    /// Stable host-side numeric user id
    pub host_user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Author {
    pub fn new(host_user_id: i64, username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::ids::AuthorId::new(),
            host_user_id,
            username: username.into(),
            display_name: None,
            created_at: now,
        }
    }
}
