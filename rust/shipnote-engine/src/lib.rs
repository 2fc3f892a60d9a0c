//! The scheduled-run engine
//!
//! A single logical worker drives monitoring entries through the
//! fetch → summarise → deliver → record pipeline. The tick loop discovers
//! due entries once a minute and executes them sequentially; the hooks
//! expose the same executor to the API layer; the reaper closes runs
//! orphaned by crashes. The engine's strongest invariant: an entry's
//! schedule is advanced after every run, failed or not, so no entry ever
//! stalls at a stale firing time.

pub mod executor;
pub mod hooks;
pub mod reaper;
pub mod tick;

use shipnote_admission::{QuotaError, QuotaKind};
use shipnote_core::RunId;
use shipnote_store::StoreError;
use thiserror::Error;

pub use executor::{ExecutorConfig, RunExecutor};
pub use hooks::PipelineHooks;
pub use reaper::Reaper;
pub use tick::TickLoop;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    /// Admission rejected an onboarding request against the plan limits
    #[error("{kind:?} quota reached ({usage}/{limit})")]
    QuotaExceeded {
        kind: QuotaKind,
        usage: u32,
        limit: u32,
    },

    /// An external worker tried to commit an already-closed run
    #[error("run {0} is already completed")]
    RunAlreadyCompleted(RunId),
}
