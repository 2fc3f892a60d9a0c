//! Repository and author registration
//!
//! Repositories are tenant-scoped with a unique `(tenant, full_name)`;
//! authors are a global registry keyed by host user id and username.

use chrono::{DateTime, Utc};
use shipnote_core::entry::EntryStatus;
use shipnote_core::repository::{Author, Repository, RepositoryStatus};
use shipnote_core::{AuthorId, RepositoryId, TenantId};

use crate::error::{StoreError, StoreResult};
use crate::{claim_unique, get_doc, must_get, put_doc, update_doc};

impl crate::Store {
    /// Register a repository. `credential` is sealed before it touches
    /// disk; passing one without a configured master key is an error.
    pub fn create_repository(
        &self,
        tenant_id: TenantId,
        owner: &str,
        name: &str,
        credential: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Repository> {
        let mut repo = Repository::new(tenant_id, owner, name, now);
        if let Some(plaintext) = credential {
            let sealer = self.sealer().ok_or_else(|| {
                StoreError::Validation(
                    "credential sealing requires a configured master key".to_string(),
                )
            })?;
            repo.sealed_credential = Some(sealer.seal(plaintext)?);
        }

        let index_key = repo_index_key(tenant_id, &repo.full_name);
        if claim_unique(&self.idx_repo_full_name, &index_key, &repo.id.to_string())?.is_some() {
            return Err(StoreError::Conflict(format!(
                "repository {} already registered for tenant {}",
                repo.full_name, tenant_id
            )));
        }
        put_doc(&self.repositories, &repo.id.to_string(), &repo)?;
        Ok(repo)
    }

    pub fn get_repository(&self, id: RepositoryId) -> StoreResult<Repository> {
        must_get(&self.repositories, &id.to_string(), "repository")
    }

    pub fn find_repository(
        &self,
        tenant_id: TenantId,
        full_name: &str,
    ) -> StoreResult<Option<Repository>> {
        let index_key = repo_index_key(tenant_id, full_name);
        match self.idx_repo_full_name.get(index_key.as_bytes())? {
            Some(id) => get_doc(&self.repositories, &String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    pub fn set_repository_status(
        &self,
        id: RepositoryId,
        status: RepositoryStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Repository> {
        update_doc(
            &self.repositories,
            &id.to_string(),
            "repository",
            |r: &mut Repository| {
                r.status = status;
                r.updated_at = now;
                Ok(())
            },
        )
    }

    /// Soft-delete a repository and pause its dependent monitoring
    /// entries. The unique-name slot is freed for re-registration.
    pub fn remove_repository(&self, id: RepositoryId, now: DateTime<Utc>) -> StoreResult<()> {
        let repo = self.set_repository_status(id, RepositoryStatus::Removed, now)?;
        self.idx_repo_full_name
            .remove(repo_index_key(repo.tenant_id, &repo.full_name).as_bytes())?;

        for entry in self.list_entries_for_repository(id)? {
            if entry.status == EntryStatus::Active {
                self.set_entry_status(entry.id, EntryStatus::Paused, now)?;
            }
        }
        Ok(())
    }

    /// Unseal the repository's own credential, if it carries one.
    pub fn repository_credential(&self, repo: &Repository) -> StoreResult<Option<String>> {
        match (&repo.sealed_credential, self.sealer()) {
            (Some(sealed), Some(sealer)) => sealer.unseal(sealed).map(Some),
            (Some(_), None) => Err(StoreError::Crypto(
                "stored credential present but no master key configured".to_string(),
            )),
            (None, _) => Ok(None),
        }
    }

    pub fn create_author(
        &self,
        host_user_id: i64,
        username: &str,
        display_name: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<Author> {
        let mut author = Author::new(host_user_id, username, now);
        author.display_name = display_name;
        let id = author.id.to_string();

        let host_key = host_user_id.to_string();
        if claim_unique(&self.idx_author_host, &host_key, &id)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "author with host user id {} already registered",
                host_user_id
            )));
        }
        let name_key = username.to_lowercase();
        if claim_unique(&self.idx_author_username, &name_key, &id)?.is_some() {
            // Roll back the first claim so a later registration can retry.
            self.idx_author_host.remove(host_key.as_bytes())?;
            return Err(StoreError::Conflict(format!(
                "author username {} already registered",
                username
            )));
        }
        put_doc(&self.authors, &id, &author)?;
        Ok(author)
    }

    pub fn get_author(&self, id: AuthorId) -> StoreResult<Author> {
        must_get(&self.authors, &id.to_string(), "author")
    }

    pub fn find_author_by_username(&self, username: &str) -> StoreResult<Option<Author>> {
        match self
            .idx_author_username
            .get(username.to_lowercase().as_bytes())?
        {
            Some(id) => get_doc(&self.authors, &String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }
}

fn repo_index_key(tenant_id: TenantId, full_name: &str) -> String {
    format!("{}:{}", tenant_id, full_name.to_lowercase())
}
