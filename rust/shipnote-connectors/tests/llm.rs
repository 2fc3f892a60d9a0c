//! LLM client contract tests against a mock provider

use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use serde_json::json;
use shipnote_connectors::llm::{LlmClient, LlmConfig};
use shipnote_connectors::{ActivityBundle, ConnectorError, PullRequestActivity, Summarizer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, min_interval: Duration) -> LlmClient {
    LlmClient::new(LlmConfig {
        api_base: server.uri(),
        api_key: "sk-test".to_string(),
        model: "test-model".to_string(),
        min_interval,
        timeout: Duration::from_secs(5),
        retry_unit: Duration::from_millis(1),
    })
    .unwrap()
}

fn bundle() -> ActivityBundle {
    ActivityBundle::from_prs(vec![PullRequestActivity {
        number: 1,
        title: "Fix pagination".to_string(),
        repo: "acme/widgets".to_string(),
        state: "merged".to_string(),
        url: "https://github.test/pr/1".to_string(),
        description: None,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        labels: vec![],
        files: vec![],
    }])
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "choices": [
            { "message": { "role": "assistant", "content": text } }
        ]
    })
}

#[tokio::test]
async fn returns_completion_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Worked on X")))
        .mount(&server)
        .await;

    let summary = client(&server, Duration::ZERO)
        .summarize(&bundle(), "Summarize this activity.")
        .await
        .unwrap();
    assert_eq!(summary, "Worked on X");
}

#[tokio::test]
async fn retries_provider_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("eventually")))
        .mount(&server)
        .await;

    let summary = client(&server, Duration::ZERO)
        .summarize(&bundle(), "Summarize.")
        .await
        .unwrap();
    assert_eq!(summary, "eventually");
}

#[tokio::test]
async fn gives_up_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, Duration::ZERO)
        .summarize(&bundle(), "Summarize.")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Server(_)));
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, Duration::ZERO)
        .summarize(&bundle(), "Summarize.")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidResponse(_)));
}

#[tokio::test]
async fn empty_bundle_is_rejected_without_a_call() {
    let server = MockServer::start().await;
    // No mock mounted: any request would 404 and fail differently.
    let err = client(&server, Duration::ZERO)
        .summarize(&ActivityBundle::default(), "Summarize.")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Validation(_)));
}

#[tokio::test]
async fn pacer_enforces_minimum_interval() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .mount(&server)
        .await;

    let client = client(&server, Duration::from_millis(120));
    let started = Instant::now();
    client.summarize(&bundle(), "one").await.unwrap();
    client.summarize(&bundle(), "two").await.unwrap();
    assert!(
        started.elapsed() >= Duration::from_millis(120),
        "second request must wait out the pacer"
    );
}
