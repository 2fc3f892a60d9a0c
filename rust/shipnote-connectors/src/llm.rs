//! LLM summariser
//!
//! Turns a fetched activity bundle into an email-ready text block via a
//! chat-completions endpoint. The prompt serialisation is deterministic so
//! identical bundles produce identical requests. A process-wide pacer
//! keeps at least `min_interval` between requests; 429 and 5xx responses
//! are retried with `2^attempt · 15 + uniform(0, 5)` units of delay.

use std::fmt::Write as _;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{ActivityBundle, ConnectorError, Summarizer};

const MAX_ATTEMPTS: u32 = 3;
const DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Floor between any two requests, process-wide
    pub min_interval: Duration,
    /// Per-call deadline
    pub timeout: Duration,
    /// Unit for retry delays; one second in production, shrunk in tests
    pub retry_unit: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            min_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
            retry_unit: Duration::from_secs(1),
        }
    }
}

pub struct LlmClient {
    http: reqwest::Client,
    cfg: LlmConfig,
    /// Completion instant of the most recent request; the pacer's state
    last_request: Mutex<Option<Instant>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, ConnectorError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            cfg,
            last_request: Mutex::new(None),
        })
    }

    /// Deterministic prompt serialisation: title, repository, state,
    /// creation date, URL, bounded description, labels, bounded patches.
    pub fn build_prompt(bundle: &ActivityBundle, instruction: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(instruction);
        prompt.push_str("\n\nPull requests:\n");
        for (i, pr) in bundle.prs.iter().enumerate() {
            let _ = writeln!(prompt, "\n{}. {}", i + 1, pr.title);
            let _ = writeln!(prompt, "   Repository: {}", pr.repo);
            let _ = writeln!(prompt, "   State: {}", pr.state);
            let _ = writeln!(prompt, "   Created: {}", pr.created_at.format("%Y-%m-%d"));
            let _ = writeln!(prompt, "   URL: {}", pr.url);
            if let Some(desc) = &pr.description {
                let bounded: String = desc.chars().take(DESCRIPTION_CHARS).collect();
                let _ = writeln!(prompt, "   Description: {}", bounded);
            }
            if !pr.labels.is_empty() {
                let _ = writeln!(prompt, "   Labels: {}", pr.labels.join(", "));
            }
            for file in &pr.files {
                let _ = writeln!(
                    prompt,
                    "   File: {} (+{}/-{})",
                    file.path, file.additions, file.deletions
                );
                if let Some(patch) = &file.patch {
                    let _ = writeln!(prompt, "   {}", patch);
                }
            }
        }
        prompt
    }

    /// Hold until at least `min_interval` has passed since the previous
    /// request. The lock is held across the sleep so concurrent callers
    /// queue up behind the pacer rather than racing it.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.cfg.min_interval {
                tokio::time::sleep(self.cfg.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn chat(&self, prompt: &str) -> Result<String, ConnectorError> {
        self.pace().await;
        let url = format!("{}/chat/completions", self.cfg.api_base);
        let request = ChatRequest {
            model: &self.cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.cfg.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = format!("{} from {}", status, url);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited(detail),
                s if s.is_server_error() => ConnectorError::Server(detail),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::Auth(detail),
                _ => ConnectorError::InvalidResponse(detail),
            });
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ConnectorError::InvalidResponse("no completion choices".to_string()))
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let spread: f64 = rand::thread_rng().gen_range(0.0..5.0);
        let units = 2u64.saturating_pow(attempt) as f64 * 15.0 + spread;
        self.cfg.retry_unit.mul_f64(units)
    }
}

#[async_trait::async_trait]
impl Summarizer for LlmClient {
    async fn summarize(
        &self,
        bundle: &ActivityBundle,
        instruction: &str,
    ) -> Result<String, ConnectorError> {
        if !bundle.has_activity {
            return Err(ConnectorError::Validation(
                "nothing to summarize: bundle has no activity".to_string(),
            ));
        }
        let prompt = Self::build_prompt(bundle, instruction);

        let mut attempt = 1u32;
        loop {
            match self.chat(&prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = self.retry_delay(attempt);
                    tracing::warn!(attempt, error = %err, "summary request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PullRequestActivity;
    use chrono::{TimeZone, Utc};

    fn bundle() -> ActivityBundle {
        ActivityBundle::from_prs(vec![PullRequestActivity {
            number: 7,
            title: "Add retry budget".to_string(),
            repo: "acme/widgets".to_string(),
            state: "open".to_string(),
            url: "https://example.com/pr/7".to_string(),
            description: Some("x".repeat(300)),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
            labels: vec!["bug".to_string(), "backend".to_string()],
            files: vec![crate::ChangedFile {
                path: "src/retry.rs".to_string(),
                status: "modified".to_string(),
                additions: 12,
                deletions: 3,
                patch: Some("+retry".to_string()),
            }],
        }])
    }

    #[test]
    fn prompt_is_deterministic() {
        let b = bundle();
        let a = LlmClient::build_prompt(&b, "Summarize this.");
        let b2 = LlmClient::build_prompt(&b, "Summarize this.");
        assert_eq!(a, b2);
    }

    #[test]
    fn prompt_bounds_description() {
        let b = bundle();
        let prompt = LlmClient::build_prompt(&b, "Summarize this.");
        let desc_line = prompt
            .lines()
            .find(|l| l.trim_start().starts_with("Description:"))
            .unwrap();
        assert!(desc_line.len() < 250, "description must be truncated");
        assert!(prompt.contains("Repository: acme/widgets"));
        assert!(prompt.contains("Labels: bug, backend"));
    }

    #[test]
    fn retry_delay_grows_with_attempts() {
        let client = LlmClient::new(LlmConfig {
            retry_unit: Duration::from_millis(1),
            ..LlmConfig::default()
        })
        .unwrap();
        let first = client.retry_delay(1);
        let second = client.retry_delay(2);
        assert!(first >= Duration::from_millis(30));
        assert!(first < Duration::from_millis(36));
        assert!(second >= Duration::from_millis(60));
    }
}
