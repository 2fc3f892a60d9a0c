//! Run failure taxonomy
//!
//! Pipeline failures are captured values, not exceptions: each kind maps
//! onto the terminal state of the run's delivery record. Every kind leaves
//! the entry's schedule advanced.

use thiserror::Error;

use crate::run::DeliveryRecord;

/// Canonical skip/failure reasons written into delivery records.
pub mod reason {
    pub const NO_ACTIVITY: &str = "No activity";
    pub const NO_RECIPIENTS: &str = "No recipients configured";
    pub const SUMMARY_FAILED: &str = "AI summary generation failed";
    pub const EMAIL_LIMIT: &str = "monthly email limit reached";
    pub const ABANDONED: &str = "abandoned";
}

/// Failure kinds surfaced by the run pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// Host rejected our credentials or the repository is gone (401/403/404)
    #[error("{0}")]
    VcsAuth(String),

    /// Host rate limit or outage persisted through the retry budget
    #[error("{0}")]
    VcsUnavailable(String),

    /// Summary generation failed after retries
    #[error("{}", reason::SUMMARY_FAILED)]
    LlmFail,

    /// Tenant reached its monthly email limit
    #[error("{}", reason::EMAIL_LIMIT)]
    QuotaReached,

    /// The fetch window held no pull requests
    #[error("{}", reason::NO_ACTIVITY)]
    NoActivity,

    /// The entry has nowhere to deliver to
    #[error("{}", reason::NO_RECIPIENTS)]
    NoRecipients,

    /// SMTP transport error
    #[error("{0}")]
    DeliveryFail(String),

    /// Anything unexpected inside the pipeline
    #[error("{0}")]
    Internal(String),
}

impl RunFailure {
    /// The terminal delivery record this failure closes the run with.
    /// `skipped` covers the defined business outcomes; `failed` is
    /// reserved for transport-level and unexpected errors.
    pub fn into_delivery(self, recipients: Vec<String>) -> DeliveryRecord {
        match &self {
            RunFailure::VcsAuth(_)
            | RunFailure::LlmFail
            | RunFailure::QuotaReached
            | RunFailure::NoActivity
            | RunFailure::NoRecipients => DeliveryRecord::skipped(self.to_string()),
            RunFailure::DeliveryFail(_) => DeliveryRecord::failed(recipients, self.to_string()),
            RunFailure::VcsUnavailable(_) | RunFailure::Internal(_) => {
                DeliveryRecord::failed(Vec::new(), self.to_string())
            }
        }
    }
}
