//! Code-host client (GitHub REST v3)
//!
//! Lists pull requests most-recently-updated first, retains those authored
//! by the target inside the fetch window, and collects bounded per-file
//! diffs. 401/403/404 are fatal for the calling run; 429 and 5xx are
//! retried up to three attempts with capped exponential backoff and ±20 %
//! jitter.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::{
    ActivityBundle, ChangedFile, ConnectorError, PullRequestActivity, PullRequestSource, RepoRef,
};

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 10;
const MAX_ATTEMPTS: u32 = 3;
const PATCH_ELLIPSIS: &str = "...";

/// Bounds on how much one run may pull from the host
#[derive(Debug, Clone, Copy)]
pub struct FetchCaps {
    pub max_prs: usize,
    pub max_files_per_pr: usize,
    pub max_patch_bytes: usize,
}

impl Default for FetchCaps {
    fn default() -> Self {
        Self {
            max_prs: 100,
            max_files_per_pr: 10,
            max_patch_bytes: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_base: String,
    /// Per-HTTP-call deadline
    pub timeout: Duration,
    /// Unit for backoff delays; one second in production, shrunk in tests
    pub retry_unit: Duration,
    pub caps: FetchCaps,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout: Duration::from_secs(15),
            retry_unit: Duration::from_secs(1),
            caps: FetchCaps::default(),
        }
    }
}

pub struct GithubClient {
    http: reqwest::Client,
    cfg: GithubConfig,
}

// Wire shapes; only the fields the pipeline consumes.

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    state: String,
    html_url: String,
    body: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    user: ApiUser,
    #[serde(default)]
    labels: Vec<ApiLabel>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResults {
    items: Vec<ApiPull>,
}

impl GithubClient {
    pub fn new(cfg: GithubConfig) -> Result<Self, ConnectorError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent("shipnote/1.0")
            .build()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    /// GET with retry on 429/5xx and status classification.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<T, ConnectorError> {
        let mut attempt = 1u32;
        loop {
            let mut req = self
                .http
                .get(url)
                .header("Accept", "application/vnd.github+json")
                .query(query);
            if let Some(token) = token {
                req = req.bearer_auth(token);
            }

            let result = match req.send().await {
                Ok(resp) => classify(resp).await,
                Err(e) => Err(ConnectorError::Transport(e.to_string())),
            };

            match result {
                Ok(resp) => {
                    return resp
                        .json::<T>()
                        .await
                        .map_err(|e| ConnectorError::InvalidResponse(e.to_string()));
                }
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt, self.cfg.retry_unit);
                    tracing::warn!(url, attempt, error = %err, "host request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn list_pull_requests(
        &self,
        repo: &RepoRef,
        token: &str,
        page: usize,
    ) -> Result<Vec<ApiPull>, ConnectorError> {
        let url = format!(
            "{}/repos/{}/{}/pulls",
            self.cfg.api_base, repo.owner, repo.name
        );
        self.get_json(
            &url,
            Some(token),
            &[
                ("state", "all".to_string()),
                ("sort", "updated".to_string()),
                ("direction", "desc".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ],
        )
        .await
    }

    /// First page only, capped by `max_files_per_pr`.
    async fn list_pr_files(
        &self,
        repo: &RepoRef,
        token: &str,
        number: u64,
    ) -> Result<Vec<ChangedFile>, ConnectorError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/files",
            self.cfg.api_base, repo.owner, repo.name, number
        );
        let files: Vec<ApiFile> = self
            .get_json(
                &url,
                Some(token),
                &[("per_page", self.cfg.caps.max_files_per_pr.to_string())],
            )
            .await?;
        Ok(files
            .into_iter()
            .take(self.cfg.caps.max_files_per_pr)
            .map(|f| ChangedFile {
                path: f.filename,
                status: f.status,
                additions: f.additions,
                deletions: f.deletions,
                patch: f
                    .patch
                    .map(|p| truncate_patch(&p, self.cfg.caps.max_patch_bytes)),
            })
            .collect())
    }

    /// Credential path: page through the repo's PRs newest-updated first,
    /// keep the target author's PRs inside the window.
    async fn fetch_with_credential(
        &self,
        repo: &RepoRef,
        token: &str,
        author: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ActivityBundle, ConnectorError> {
        let mut retained = Vec::new();
        'pages: for page in 1..=MAX_PAGES {
            let pulls = self.list_pull_requests(repo, token, page).await?;
            let page_len = pulls.len();
            for pull in pulls {
                // Sorted by update time descending: everything from here
                // on is older than the window.
                if pull.updated_at < from {
                    break 'pages;
                }
                if pull.updated_at <= to && pull.user.login.eq_ignore_ascii_case(author) {
                    retained.push(pull);
                    if retained.len() >= self.cfg.caps.max_prs {
                        break 'pages;
                    }
                }
            }
            if page_len < PAGE_SIZE {
                break;
            }
        }

        let mut prs = Vec::with_capacity(retained.len());
        for pull in retained {
            let files = self.list_pr_files(repo, token, pull.number).await?;
            prs.push(to_activity(pull, repo.full_name(), files));
        }
        Ok(ActivityBundle::from_prs(prs))
    }

    /// Fallback without a credential: host-wide author search restricted
    /// to the window. Cannot see private repositories and returns no
    /// per-file diffs.
    async fn fetch_via_search(
        &self,
        repo: &RepoRef,
        author: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ActivityBundle, ConnectorError> {
        let url = format!("{}/search/issues", self.cfg.api_base);
        let query = format!(
            "author:{} is:pr updated:{}..{}",
            author,
            from.to_rfc3339_opts(SecondsFormat::Secs, true),
            to.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let results: ApiSearchResults = self
            .get_json(
                &url,
                None,
                &[("q", query), ("per_page", PAGE_SIZE.to_string())],
            )
            .await?;
        let prs = results
            .items
            .into_iter()
            .filter(|item| item.updated_at >= from && item.updated_at <= to)
            .take(self.cfg.caps.max_prs)
            .map(|item| to_activity(item, repo.full_name(), Vec::new()))
            .collect();
        Ok(ActivityBundle::from_prs(prs))
    }
}

#[async_trait::async_trait]
impl PullRequestSource for GithubClient {
    async fn fetch_activity(
        &self,
        repo: &RepoRef,
        credential: Option<&str>,
        author: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ActivityBundle, ConnectorError> {
        match credential {
            Some(token) => self.fetch_with_credential(repo, token, author, from, to).await,
            None => self.fetch_via_search(repo, author, from, to).await,
        }
    }
}

async fn classify(resp: reqwest::Response) -> Result<reqwest::Response, ConnectorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = format!("{} from {}", status, resp.url());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ConnectorError::Auth(detail)),
        StatusCode::NOT_FOUND => Err(ConnectorError::NotFound(detail)),
        StatusCode::TOO_MANY_REQUESTS => Err(ConnectorError::RateLimited(detail)),
        s if s.is_server_error() => Err(ConnectorError::Server(detail)),
        _ => Err(ConnectorError::InvalidResponse(detail)),
    }
}

/// `min(2^attempt, 30)` units with ±20 % jitter.
fn backoff_delay(attempt: u32, unit: Duration) -> Duration {
    let factor = 2u64.saturating_pow(attempt).min(30) as f64;
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    unit.mul_f64(factor * jitter)
}

fn to_activity(pull: ApiPull, repo: String, files: Vec<ChangedFile>) -> PullRequestActivity {
    PullRequestActivity {
        number: pull.number,
        title: pull.title,
        repo,
        state: pull.state,
        url: pull.html_url,
        description: pull.body,
        created_at: pull.created_at,
        updated_at: pull.updated_at,
        labels: pull.labels.into_iter().map(|l| l.name).collect(),
        files,
    }
}

/// Byte-bounded truncation on a char boundary, with an ellipsis marker.
fn truncate_patch(patch: &str, max_bytes: usize) -> String {
    if patch.len() <= max_bytes {
        return patch.to_string();
    }
    let mut end = max_bytes;
    while !patch.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &patch[..end], PATCH_ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let patch = "ab€def";
        // The euro sign spans bytes 2..5; cutting at 4 must back up to 2.
        let out = truncate_patch(patch, 4);
        assert_eq!(out, "ab...");
    }

    #[test]
    fn short_patches_pass_through() {
        assert_eq!(truncate_patch("+fn main() {}", 500), "+fn main() {}");
    }

    #[test]
    fn backoff_is_capped_and_jittered() {
        let unit = Duration::from_secs(1);
        for attempt in 1..=8 {
            let d = backoff_delay(attempt, unit);
            assert!(d >= unit.mul_f64(0.8));
            assert!(d <= Duration::from_secs(30).mul_f64(1.2));
        }
    }
}
