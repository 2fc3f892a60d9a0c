//! Run executor
//!
//! Executes one monitoring entry end to end: open the run record, derive
//! the fetch window, resolve the access credential, fetch activity,
//! summarise, deliver under quota admission, close the run, and advance
//! the schedule. Failures inside the pipeline are captured values that
//! pick the delivery record's terminal state; they never prevent the
//! schedule from advancing.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shipnote_admission::{QuotaDecision, QuotaGate, QuotaKind};
use shipnote_connectors::{Mailer, OutboundEmail, PullRequestSource, RepoRef, Summarizer};
use shipnote_core::entry::{FetchWindow, MonitoringEntry};
use shipnote_core::failure::RunFailure;
use shipnote_core::repository::RepositoryStatus;
use shipnote_core::run::{DeliveryRecord, PrStats, RunOutcome, RunRecord, TriggerType};
use shipnote_schedule::next_firing;
use shipnote_store::Store;

use crate::EngineError;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Window for `since_last_run` entries that have never run
    pub default_fetch_window: Duration,
    /// Process-global fallback token for repositories without their own
    pub global_token: Option<String>,
    /// Purpose line prepended to every summary prompt
    pub summary_instruction: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_fetch_window: Duration::hours(24),
            global_token: None,
            summary_instruction: "Write the body of a concise status-update email summarizing \
                                  this engineer's pull-request activity. No subject line, no \
                                  greeting, no signature."
                .to_string(),
        }
    }
}

pub struct RunExecutor {
    store: Arc<Store>,
    quota: QuotaGate,
    source: Arc<dyn PullRequestSource>,
    summarizer: Arc<dyn Summarizer>,
    mailer: Arc<dyn Mailer>,
    cfg: ExecutorConfig,
    /// The single logical worker: all run execution serialises here, so
    /// no more than one run is ever in flight for any entry.
    worker: tokio::sync::Mutex<()>,
}

/// Fields accumulated as the pipeline progresses; `finish` pins the
/// delivery record and yields the terminal outcome.
struct PipelineState {
    window_from: DateTime<Utc>,
    window_to: DateTime<Utc>,
    pr_stats: PrStats,
    has_activity: bool,
    summary: Option<String>,
    note_snapshot: Option<String>,
}

impl PipelineState {
    /// Terminate with a classified failure; the taxonomy picks the
    /// delivery record's terminal state.
    fn abort(self, failure: RunFailure) -> RunOutcome {
        self.finish(failure.into_delivery(Vec::new()))
    }

    fn finish(self, delivery: DeliveryRecord) -> RunOutcome {
        RunOutcome {
            window_from: Some(self.window_from),
            window_to: Some(self.window_to),
            pr_stats: self.pr_stats,
            has_activity: self.has_activity,
            summary: self.summary,
            note_snapshot: self.note_snapshot,
            delivery,
        }
    }
}

impl RunExecutor {
    pub fn new(
        store: Arc<Store>,
        quota: QuotaGate,
        source: Arc<dyn PullRequestSource>,
        summarizer: Arc<dyn Summarizer>,
        mailer: Arc<dyn Mailer>,
        cfg: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            quota,
            source,
            summarizer,
            mailer,
            cfg,
            worker: tokio::sync::Mutex::new(()),
        }
    }

    /// Open a run for `entry` and execute it to completion.
    pub async fn execute(
        &self,
        entry: &MonitoringEntry,
        trigger: TriggerType,
        window_override: Option<(DateTime<Utc>, DateTime<Utc>)>,
        now: DateTime<Utc>,
    ) -> Result<RunRecord, EngineError> {
        let scheduled_for = match trigger {
            TriggerType::Scheduled => entry.next_run_at,
            TriggerType::Manual => None,
        };
        let run = self.store.create_run(entry, trigger, scheduled_for, now)?;
        self.execute_opened(entry, run, window_override, now).await
    }

    /// Execute an already-opened run. Used by `execute` and by the manual
    /// trigger hook, which opens the run first so it can hand the id back
    /// before the pipeline finishes.
    pub async fn execute_opened(
        &self,
        entry: &MonitoringEntry,
        run: RunRecord,
        window_override: Option<(DateTime<Utc>, DateTime<Utc>)>,
        now: DateTime<Utc>,
    ) -> Result<RunRecord, EngineError> {
        let _worker = self.worker.lock().await;
        tracing::info!(
            entry_id = %entry.id,
            run_id = %run.id,
            trigger = ?run.trigger,
            "executing run"
        );

        let outcome = self.run_pipeline(entry, window_override, now).await;
        let delivery_status = outcome.delivery.status;
        let completion = self.store.complete_run(run.id, outcome, now)?;

        // The last write of every run: the schedule moves forward no
        // matter what happened above.
        let next = next_firing(&entry.schedule, now);
        self.store.advance_schedule(entry.id, now, next)?;

        tracing::info!(
            entry_id = %entry.id,
            run_id = %run.id,
            delivery = ?delivery_status,
            next_run_at = ?next,
            "run closed, schedule advanced"
        );
        Ok(completion.record().clone())
    }

    /// Steps 2–7. Infallible by construction: every failure is folded
    /// into the outcome's delivery record.
    async fn run_pipeline(
        &self,
        entry: &MonitoringEntry,
        window_override: Option<(DateTime<Utc>, DateTime<Utc>)>,
        now: DateTime<Utc>,
    ) -> RunOutcome {
        let (from, to) = match window_override {
            Some(window) => window,
            None => match entry.fetch_window {
                FetchWindow::SinceLastRun => (
                    entry
                        .last_run_at
                        .unwrap_or(now - self.cfg.default_fetch_window),
                    now,
                ),
                FetchWindow::ExplicitRange { from, to } => (from, to),
            },
        };
        let mut state = PipelineState {
            window_from: from,
            window_to: to,
            pr_stats: PrStats::default(),
            has_activity: false,
            summary: None,
            note_snapshot: entry.note.clone(),
        };

        // Resolve repository, author, and credential.
        let repo = match self.store.get_repository(entry.repository_id) {
            Ok(repo) => repo,
            Err(e) => return state.abort(RunFailure::Internal(e.to_string())),
        };
        let author = match self.store.get_author(entry.author_id) {
            Ok(author) => author,
            Err(e) => return state.abort(RunFailure::Internal(e.to_string())),
        };
        let credential = match self.store.repository_credential(&repo) {
            Ok(own) => own.or_else(|| self.cfg.global_token.clone()),
            Err(e) => return state.abort(RunFailure::Internal(e.to_string())),
        };

        // Fetch stage.
        let repo_ref = RepoRef::new(&repo.owner, &repo.name);
        let bundle = match self
            .source
            .fetch_activity(&repo_ref, credential.as_deref(), &author.username, from, to)
            .await
        {
            Ok(bundle) => bundle,
            Err(err) if err.is_auth_failure() => {
                // Fatal for this run; the repository needs a new token.
                tracing::warn!(repository_id = %repo.id, error = %err, "host rejected repository access");
                if let Err(e) =
                    self.store
                        .set_repository_status(repo.id, RepositoryStatus::TokenError, now)
                {
                    tracing::error!(repository_id = %repo.id, error = %e, "failed to mark repository");
                }
                return state.abort(RunFailure::VcsAuth(err.to_string()));
            }
            Err(err) => {
                return state.abort(RunFailure::VcsUnavailable(err.to_string()));
            }
        };
        state.pr_stats = PrStats {
            count: bundle.prs.len() as u32,
            numbers: bundle.pr_numbers(),
        };
        state.has_activity = bundle.has_activity;

        if !bundle.has_activity {
            return state.abort(RunFailure::NoActivity);
        }

        // Summarise stage; failure downgrades the run, never aborts it.
        state.summary = match self
            .summarizer
            .summarize(&bundle, &self.cfg.summary_instruction)
            .await
        {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(entry_id = %entry.id, error = %err, "summary generation failed");
                None
            }
        };
        let Some(body) = state.summary.clone() else {
            return state.abort(RunFailure::LlmFail);
        };

        if entry.recipients.is_empty() {
            return state.abort(RunFailure::NoRecipients);
        }

        // Quota admission, then delivery. A transport failure hands the
        // admitted unit back so usage reflects mail actually sent.
        match self.quota.consume(entry.tenant_id, QuotaKind::Email, now) {
            Ok(QuotaDecision::Admitted { .. }) => {}
            Ok(QuotaDecision::Rejected { usage, limit }) => {
                tracing::info!(tenant_id = %entry.tenant_id, usage, limit, "email quota reached");
                return state.abort(RunFailure::QuotaReached);
            }
            Err(e) => return state.abort(RunFailure::Internal(e.to_string())),
        }

        let email = OutboundEmail {
            recipients: entry.recipients.clone(),
            subject: subject_line(&author.username, &repo.full_name),
            body_text: body,
        };
        match self.mailer.send(&email).await {
            Ok(()) => state.finish(DeliveryRecord::sent(entry.recipients.clone(), now)),
            Err(err) => {
                if let Err(e) = self.quota.release(entry.tenant_id, QuotaKind::Email, now) {
                    tracing::error!(tenant_id = %entry.tenant_id, error = %e, "quota release failed");
                }
                let failure = RunFailure::DeliveryFail(err.to_string());
                state.finish(failure.into_delivery(entry.recipients.clone()))
            }
        }
    }
}

fn subject_line(author: &str, repo_full_name: &str) -> String {
    format!("Status update: {} on {}", author, repo_full_name)
}
