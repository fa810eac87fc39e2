//! End-to-end invocations against a stand-in upstream.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::http::StatusCode;
use promptgate::config::{ProviderConfig, ProviderKind};
use promptgate::display;
use promptgate::gateway::{InvocationRequest, Orchestrator};
use promptgate::session::{ConversationTurn, Role, SessionHandle, SessionStore};
use tempfile::TempDir;

use crate::support::{Reply, Upstream};

fn anthropic(upstream: &Upstream) -> ProviderConfig {
    ProviderConfig {
        endpoint: upstream.endpoint("/v1/messages"),
        model: "claude-test".to_string(),
        api_key: "sk-e2e".to_string(),
        headers: BTreeMap::new(),
        kind: ProviderKind::Anthropic,
    }
}

fn orchestrator(config: ProviderConfig) -> Orchestrator {
    Orchestrator::from_config(config)
        .expect("Failed to build orchestrator")
        .with_backoff_step(Duration::from_millis(10))
}

fn request(prompt: &str, attempts: u32) -> InvocationRequest {
    InvocationRequest {
        attempts,
        ..InvocationRequest::new("claude4", prompt)
    }
}

#[tokio::test]
async fn session_context_flows_into_next_call() {
    let upstream = Upstream::start(
        vec![Reply::anthropic_text("hello"), Reply::anthropic_text("good")],
        Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "unexpected extra call"),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());
    let orch = orchestrator(anthropic(&upstream));

    let mut handle = store.open("claude4", "chat").unwrap();
    let first = orch.invoke(&request("hi", 1), &mut handle).await;
    assert!(first.is_success(), "{:?}", first.error());
    drop(handle);

    let mut handle = store.open("claude4", "chat").unwrap();
    let second = orch.invoke(&request("how are you", 1), &mut handle).await;
    assert_eq!(second.response(), "good");

    let requests = upstream.requests();
    assert_eq!(requests[0].body["messages"][0]["content"], "hi");
    assert_eq!(
        requests[1].body["messages"][0]["content"],
        "Human: hi\n\nAssistant: hello\n\nHuman: how are you"
    );

    let history = handle.session().history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2], ConversationTurn::user("how are you"));
    assert_eq!(history[3].role, Role::Assistant);
    drop(handle);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("claude4-chat.json")).unwrap())
            .unwrap();
    assert_eq!(saved["history"].as_array().unwrap().len(), 4);
    assert_eq!(saved["history"][0]["role"], "user");
    assert_eq!(saved["history"][0]["content"], "hi");
}

#[tokio::test]
async fn failed_invocation_does_not_persist() {
    let upstream = Upstream::start(
        vec![],
        Reply::error(StatusCode::UNAUTHORIZED, "bad key"),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());
    let orch = orchestrator(anthropic(&upstream));

    let mut handle = store.open("claude4", "doomed").unwrap();
    let outcome = orch.invoke(&request("hi", 2), &mut handle).await;

    assert_eq!(outcome.error(), Some("bad key"));
    assert_eq!(outcome.response(), "");
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(upstream.hits(), 2);
    assert!(handle.session().is_empty());
    assert!(!dir.path().join("claude4-doomed.json").exists());
}

#[tokio::test]
async fn retry_recovers_from_transient_failures() {
    let upstream = Upstream::start(
        vec![
            Reply::error(StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
            Reply::raw(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
        ],
        Reply::anthropic_text("finally"),
    )
    .await;
    let orch = orchestrator(anthropic(&upstream));

    let outcome = orch
        .invoke(&request("hi", 3), &mut SessionHandle::detached())
        .await;

    assert_eq!(outcome.response(), "finally");
    assert_eq!(upstream.hits(), 3);
    assert_eq!(orch.breaker().state().await.consecutive_failures, 0);
}

#[tokio::test]
async fn breaker_opens_after_three_failures() {
    let upstream = Upstream::start(
        vec![],
        Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
    )
    .await;
    let orch = orchestrator(anthropic(&upstream));

    let outcome = orch
        .invoke(&request("hi", 5), &mut SessionHandle::detached())
        .await;

    assert_eq!(outcome.error(), Some("circuit open"));
    assert_eq!(upstream.hits(), 3);
    assert!(orch.breaker().is_open().await);
}

#[tokio::test]
async fn unknown_provider_never_reaches_network() {
    let upstream = Upstream::start(vec![], Reply::anthropic_text("unused")).await;
    let mut config = anthropic(&upstream);
    config.kind = ProviderKind::Unsupported("custom".to_string());
    let orch = orchestrator(config);

    let outcome = orch
        .invoke(&request("hi", 3), &mut SessionHandle::detached())
        .await;

    assert_eq!(outcome.error(), Some("unknown provider type: custom"));
    assert_eq!(upstream.hits(), 0);
    assert_eq!(orch.breaker().state().await.consecutive_failures, 1);
}

#[tokio::test]
async fn deadline_bounds_whole_invocation() {
    let upstream = Upstream::start_with_delay(
        vec![],
        Reply::anthropic_text("slow"),
        Duration::from_secs(3),
    )
    .await;
    let orch = orchestrator(anthropic(&upstream));
    let req = InvocationRequest {
        timeout: Duration::from_millis(300),
        ..request("hi", 3)
    };

    let started = std::time::Instant::now();
    let outcome = orch.invoke(&req, &mut SessionHandle::detached()).await;

    assert_eq!(outcome.error(), Some("request timed out"));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(outcome.duration_ms() >= 300);
}

#[tokio::test]
async fn json_outcome_rendering() {
    let upstream = Upstream::start(vec![], Reply::anthropic_text("rendered")).await;
    let orch = orchestrator(anthropic(&upstream));

    let outcome = orch
        .invoke(&request("render me", 1), &mut SessionHandle::detached())
        .await;

    let mut out = Vec::new();
    display::write_outcome_json(&mut out, &outcome).unwrap();
    let line = String::from_utf8(out).unwrap();
    assert!(line.ends_with('\n'));

    let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(json["model"], "claude4");
    assert_eq!(json["prompt"], "render me");
    assert_eq!(json["response"], "rendered");
    assert_eq!(json["pid"], std::process::id());
    assert!(json.get("error").is_none());
    assert!(json["timestamp"].as_i64().unwrap() > 1_700_000_000);

    let mut out = Vec::new();
    display::write_response(&mut out, &outcome).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "rendered\n");
}
