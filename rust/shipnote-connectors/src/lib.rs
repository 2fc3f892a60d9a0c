//! External service clients
//!
//! Typed clients for the three remote dependencies of the run pipeline:
//! the code host (pull-request activity), the LLM provider (summaries),
//! and the SMTP relay (delivery). The executor consumes them through the
//! seam traits below, so tests can substitute in-memory fakes.

pub mod github;
pub mod llm;
pub mod mail;
pub mod render;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Connector errors, classified by how the pipeline reacts to them
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    /// Credentials rejected (401/403)
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Resource missing (404); treated like an auth failure for runs
    #[error("not found: {0}")]
    NotFound(String),

    /// Provider throttling (429)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider-side failure (5xx)
    #[error("server error: {0}")]
    Server(String),

    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl ConnectorError {
    /// Auth-shaped failures are fatal for the run and flip the
    /// repository to `token_error`.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ConnectorError::Auth(_) | ConnectorError::NotFound(_))
    }

    /// Only throttling and provider-side errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::RateLimited(_) | ConnectorError::Server(_)
        )
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        ConnectorError::Transport(err.to_string())
    }
}

/// Repository address on the code host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// One pull request retained by the fetch stage
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestActivity {
    pub number: u64,
    pub title: String,
    pub repo: String,
    pub state: String,
    pub url: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub labels: Vec<String>,
    pub files: Vec<ChangedFile>,
}

/// A changed file with its (bounded) patch
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedFile {
    pub path: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: Option<String>,
}

/// Everything the fetch stage hands downstream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityBundle {
    pub prs: Vec<PullRequestActivity>,
    pub has_activity: bool,
}

impl ActivityBundle {
    pub fn from_prs(prs: Vec<PullRequestActivity>) -> Self {
        let has_activity = !prs.is_empty();
        Self { prs, has_activity }
    }

    pub fn pr_numbers(&self) -> Vec<u64> {
        self.prs.iter().map(|pr| pr.number).collect()
    }
}

/// Outbound message handed to the mailer
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body_text: String,
}

/// Fetch stage seam
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Pull requests authored by `author` on `repo` whose update instant
    /// falls inside `[from, to]`. Without a credential the host-wide
    /// author search is used, which cannot see private repositories.
    async fn fetch_activity(
        &self,
        repo: &RepoRef,
        credential: Option<&str>,
        author: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ActivityBundle, ConnectorError>;
}

/// Summarise stage seam
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        bundle: &ActivityBundle,
        instruction: &str,
    ) -> Result<String, ConnectorError>;
}

/// Deliver stage seam
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), ConnectorError>;
}
