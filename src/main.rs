//! shipnote daemon
//!
//! Wires the store, the external-service clients, and the engine together,
//! then runs the tick loop and the reaper until a shutdown signal arrives.
//! Shutdown is cooperative: polling stops immediately, the in-flight run
//! gets the configured grace window to finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use shipnote_admission::QuotaGate;
use shipnote_config::EngineConfig;
use shipnote_connectors::github::{GithubClient, GithubConfig};
use shipnote_connectors::llm::{LlmClient, LlmConfig};
use shipnote_connectors::mail::{MailerConfig, SmtpMailer, SmtpProvider};
use shipnote_engine::{ExecutorConfig, Reaper, RunExecutor, TickLoop};
use shipnote_store::Store;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "shipnote", about = "Scheduled pull-request status-update mailer")]
struct Args {
    /// Data directory for the document store
    #[arg(long, env = "SHIPNOTE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = EngineConfig::from_env().context("loading configuration")?;
    if let Some(dir) = args.data_dir {
        cfg.data_dir = dir;
    }

    let store = Arc::new(
        Store::open(&cfg.data_dir, cfg.credential_key.as_deref())
            .with_context(|| format!("opening store at {}", cfg.data_dir.display()))?,
    );

    let source = Arc::new(GithubClient::new(GithubConfig {
        api_base: cfg.vcs.api_base.clone(),
        ..GithubConfig::default()
    })?);
    let summarizer = Arc::new(LlmClient::new(LlmConfig {
        api_base: cfg.llm.api_base.clone(),
        api_key: cfg
            .llm
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("SHIPNOTE_LLM_API_KEY is not set"))?,
        model: cfg.llm.model.clone(),
        min_interval: cfg.llm.min_interval,
        ..LlmConfig::default()
    })?);

    let smtp = cfg.smtp.as_ref().ok_or_else(|| {
        anyhow!("SMTP delivery is unconfigured: set SHIPNOTE_SMTP_USER and SHIPNOTE_SMTP_PASSWORD")
    })?;
    let mailer = Arc::new(SmtpMailer::new(&MailerConfig {
        provider: smtp.provider.parse::<SmtpProvider>()?,
        user: smtp.user.clone(),
        app_password: smtp.app_password.clone(),
        timeout: Duration::from_secs(30),
    })?);

    let executor = Arc::new(RunExecutor::new(
        store.clone(),
        QuotaGate::new(store.clone()),
        source,
        summarizer,
        mailer,
        ExecutorConfig {
            default_fetch_window: chrono::Duration::from_std(cfg.default_fetch_window)?,
            global_token: cfg.vcs.global_token.clone(),
            ..ExecutorConfig::default()
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick = TickLoop::new(
        store.clone(),
        executor.clone(),
        cfg.poll_period,
        shutdown_rx.clone(),
    );
    let reaper = Reaper::new(store.clone(), cfg.grace_window, cfg.reaper_period);

    let tick_handle = tokio::spawn(tick.run());
    let reaper_handle = tokio::spawn(reaper.run(shutdown_rx));

    tracing::info!(
        data_dir = %cfg.data_dir.display(),
        poll_secs = cfg.poll_period.as_secs(),
        "shipnote engine running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    // The in-flight run may finish; past the grace window it is abandoned
    // and the next startup's reaper sweep will close it.
    if tokio::time::timeout(cfg.grace_window, tick_handle)
        .await
        .is_err()
    {
        tracing::warn!(
            grace_secs = cfg.grace_window.as_secs(),
            "grace window elapsed, abandoning in-progress run"
        );
    }
    reaper_handle.abort();
    tracing::info!("shipnote engine stopped");
    Ok(())
}
