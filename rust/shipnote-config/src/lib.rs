//! Engine configuration
//!
//! Every knob is a flat scalar read once at initialisation from
//! `SHIPNOTE_*` environment variables, with the defaults the engine is
//! specified to run with: a 60-second poll period, a 5-minute executor
//! grace window, a 2-second LLM pacing floor, and a 24-hour default fetch
//! window.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Code-host access settings
#[derive(Debug, Clone)]
pub struct VcsSettings {
    pub api_base: String,
    /// Process-global fallback token used when a repository carries no
    /// credential of its own
    pub global_token: Option<String>,
}

/// LLM provider settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub min_interval: Duration,
}

/// SMTP provider settings; absent when mail delivery is unconfigured
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub provider: String,
    pub user: String,
    pub app_password: String,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// Tick loop period
    pub poll_period: Duration,
    /// How long an in-progress run may outlive a shutdown or crash
    pub grace_window: Duration,
    /// Interval between abandoned-run sweeps
    pub reaper_period: Duration,
    /// Window for `since_last_run` entries that have never run
    pub default_fetch_window: Duration,
    pub vcs: VcsSettings,
    pub llm: LlmSettings,
    pub smtp: Option<SmtpSettings>,
    /// 64-hex-char master key for credential sealing
    pub credential_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            poll_period: Duration::from_secs(60),
            grace_window: Duration::from_secs(300),
            reaper_period: Duration::from_secs(3600),
            default_fetch_window: Duration::from_secs(24 * 3600),
            vcs: VcsSettings {
                api_base: "https://api.github.com".to_string(),
                global_token: None,
            },
            llm: LlmSettings {
                api_base: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                min_interval: Duration::from_secs(2),
            },
            smtp: None,
            credential_key: None,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment, applying defaults for anything
    /// unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(dir) = var("SHIPNOTE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        cfg.poll_period = secs_var("SHIPNOTE_POLL_PERIOD_SECS", cfg.poll_period)?;
        cfg.grace_window = secs_var("SHIPNOTE_GRACE_WINDOW_SECS", cfg.grace_window)?;
        cfg.reaper_period = secs_var("SHIPNOTE_REAPER_PERIOD_SECS", cfg.reaper_period)?;
        cfg.default_fetch_window =
            secs_var("SHIPNOTE_DEFAULT_FETCH_WINDOW_SECS", cfg.default_fetch_window)?;

        if let Some(base) = var("SHIPNOTE_VCS_API_BASE") {
            cfg.vcs.api_base = base;
        }
        cfg.vcs.global_token = var("SHIPNOTE_VCS_TOKEN");

        if let Some(base) = var("SHIPNOTE_LLM_API_BASE") {
            cfg.llm.api_base = base;
        }
        cfg.llm.api_key = var("SHIPNOTE_LLM_API_KEY");
        if let Some(model) = var("SHIPNOTE_LLM_MODEL") {
            cfg.llm.model = model;
        }
        cfg.llm.min_interval = secs_var("SHIPNOTE_LLM_MIN_INTERVAL_SECS", cfg.llm.min_interval)?;

        cfg.smtp = match (var("SHIPNOTE_SMTP_USER"), var("SHIPNOTE_SMTP_PASSWORD")) {
            (Some(user), Some(app_password)) => Some(SmtpSettings {
                provider: var("SHIPNOTE_SMTP_PROVIDER").unwrap_or_else(|| "gmail".to_string()),
                user,
                app_password,
            }),
            _ => None,
        };

        cfg.credential_key = var("SHIPNOTE_CREDENTIAL_KEY");
        Ok(cfg)
    }
}

/// Trimmed, non-empty environment value.
fn var(name: &'static str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                name,
                value: raw,
                reason: e.to_string(),
            }),
    }
}
