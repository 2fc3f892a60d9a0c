//! sled-backed document store for shipnote records
//!
//! One tree per record kind with serde_json values, plus dedicated index
//! trees for the unique keys the data model requires:
//! `(tenant, full_name)` for repositories, `(tenant, author, repository)`
//! for monitoring entries, and host-user-id / username for authors.
//! Counter updates and document mutation go through a compare-and-swap
//! loop so concurrent writers never lose an update.

pub mod credential;
pub mod error;

mod catalog;
mod entries;
mod runs;
mod tenants;

pub use entries::NewEntry;
pub use error::{StoreError, StoreResult};
pub use runs::Completion;
pub use tenants::UsageField;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use credential::CredentialSealer;

pub struct Store {
    #[allow(dead_code)]
    db: sled::Db,
    pub(crate) tenants: sled::Tree,
    pub(crate) repositories: sled::Tree,
    pub(crate) authors: sled::Tree,
    pub(crate) entries: sled::Tree,
    pub(crate) runs: sled::Tree,
    /// `{entry_id}/{started_millis}/{run_id}` → run id, for per-entry history
    pub(crate) runs_by_entry: sled::Tree,
    /// `{tenant_id}:{full_name_lower}` → repository id
    pub(crate) idx_repo_full_name: sled::Tree,
    /// `{tenant_id}:{author_id}:{repository_id}` → entry id
    pub(crate) idx_entry_triple: sled::Tree,
    /// `{host_user_id}` → author id
    pub(crate) idx_author_host: sled::Tree,
    /// `{username_lower}` → author id
    pub(crate) idx_author_username: sled::Tree,
    sealer: Option<CredentialSealer>,
}

impl Store {
    /// Open (or create) the store at `path`. `master_key_hex` enables
    /// credential sealing; without it repositories cannot carry their own
    /// credentials and fetches rely on the process-global token.
    pub fn open<P: AsRef<Path>>(path: P, master_key_hex: Option<&str>) -> StoreResult<Self> {
        let db = sled::open(path)?;
        let sealer = master_key_hex
            .map(CredentialSealer::from_hex_key)
            .transpose()?;
        Ok(Self {
            tenants: db.open_tree("tenants")?,
            repositories: db.open_tree("repositories")?,
            authors: db.open_tree("authors")?,
            entries: db.open_tree("entries")?,
            runs: db.open_tree("runs")?,
            runs_by_entry: db.open_tree("runs_by_entry")?,
            idx_repo_full_name: db.open_tree("idx_repo_full_name")?,
            idx_entry_triple: db.open_tree("idx_entry_triple")?,
            idx_author_host: db.open_tree("idx_author_host")?,
            idx_author_username: db.open_tree("idx_author_username")?,
            db,
            sealer,
        })
    }

    pub(crate) fn sealer(&self) -> Option<&CredentialSealer> {
        self.sealer.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Document helpers shared by the record modules
// ---------------------------------------------------------------------------

pub(crate) fn put_doc<T: Serialize>(tree: &sled::Tree, key: &str, doc: &T) -> StoreResult<()> {
    tree.insert(key.as_bytes(), serde_json::to_vec(doc)?)?;
    Ok(())
}

pub(crate) fn get_doc<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> StoreResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn must_get<T: DeserializeOwned>(
    tree: &sled::Tree,
    key: &str,
    kind: &'static str,
) -> StoreResult<T> {
    get_doc(tree, key)?.ok_or_else(|| StoreError::not_found(kind, key))
}

/// Read-modify-write with a compare-and-swap retry loop. The closure may
/// fail (validation), which aborts without writing.
pub(crate) fn update_doc<T, F>(
    tree: &sled::Tree,
    key: &str,
    kind: &'static str,
    mut mutate: F,
) -> StoreResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(&mut T) -> StoreResult<()>,
{
    loop {
        let current = tree
            .get(key.as_bytes())?
            .ok_or_else(|| StoreError::not_found(kind, key))?;
        let mut doc: T = serde_json::from_slice(&current)?;
        mutate(&mut doc)?;
        let next = serde_json::to_vec(&doc)?;
        match tree.compare_and_swap(key.as_bytes(), Some(current), Some(next))? {
            Ok(()) => return Ok(doc),
            Err(_) => continue,
        }
    }
}

/// Claim a unique index slot. Returns the already-registered id when the
/// slot is taken.
pub(crate) fn claim_unique(tree: &sled::Tree, key: &str, id: &str) -> StoreResult<Option<String>> {
    match tree.compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(id.as_bytes()))? {
        Ok(()) => Ok(None),
        Err(cas) => {
            let current = cas
                .current
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .unwrap_or_default();
            Ok(Some(current))
        }
    }
}
