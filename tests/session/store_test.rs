//! Session files across invocations and processes.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::Duration;

use promptgate::config::{ProviderConfig, ProviderKind};
use promptgate::gateway::{InvocationRequest, Orchestrator};
use promptgate::session::{ConversationTurn, Session, SessionKey, SessionStore, MAX_HISTORY};
use tempfile::TempDir;

use crate::support::{Reply, Upstream};

#[tokio::test]
async fn full_history_stays_capped_after_invocation() {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());

    let turns = (0..MAX_HISTORY).map(|i| {
        if i % 2 == 0 {
            ConversationTurn::user(format!("q{i}"))
        } else {
            ConversationTurn::assistant(format!("a{i}"))
        }
    });
    std::fs::write(
        dir.path().join("gpt4-long.json"),
        serde_json::to_string(&Session::from_turns(turns)).unwrap(),
    )
    .unwrap();

    let upstream = Upstream::start(vec![], Reply::openai_text("latest")).await;
    let orch = Orchestrator::from_config(ProviderConfig {
        endpoint: upstream.endpoint("/v1/chat/completions"),
        model: "gpt-test".to_string(),
        api_key: "sk".to_string(),
        headers: BTreeMap::new(),
        kind: ProviderKind::OpenAi,
    })
    .unwrap();

    let mut handle = store.open("gpt4", "long").unwrap();
    let outcome = orch
        .invoke(&InvocationRequest::new("gpt4", "next"), &mut handle)
        .await;
    assert!(outcome.is_success());
    drop(handle);

    let handle = store.open("gpt4", "long").unwrap();
    let history = handle.session().history();
    assert_eq!(history.len(), MAX_HISTORY);
    assert_eq!(history[0].content, "q2");
    assert_eq!(history[MAX_HISTORY - 2], ConversationTurn::user("next"));
    assert_eq!(history[MAX_HISTORY - 1], ConversationTurn::assistant("latest"));
}

#[test]
fn second_open_waits_for_first_handle() {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());

    let mut first = store.open("claude4", "shared").unwrap();
    first.session_mut().record_exchange("one", "1");

    let (tx, rx) = mpsc::channel();
    let contender = store.clone();
    let waiter = std::thread::spawn(move || {
        let handle = contender.open("claude4", "shared").unwrap();
        tx.send(handle.session().len()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    first.save().unwrap();
    drop(first);

    let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(seen, 2);
    waiter.join().unwrap();
}

#[test]
fn sessions_are_keyed_by_model_and_id() {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path());

    for (model, id) in [("claude4", "a"), ("gpt4", "a"), ("claude4", "b")] {
        let mut handle = store.open(model, id).unwrap();
        handle.session_mut().record_exchange(format!("{model}/{id}"), "ok");
        handle.save().unwrap();
    }

    let handle = store.open("gpt4", "a").unwrap();
    assert_eq!(handle.session().history()[0].content, "gpt4/a");
    drop(handle);

    assert_eq!(
        store.list().unwrap(),
        vec![
            SessionKey::new("claude4", "a"),
            SessionKey::new("claude4", "b"),
            SessionKey::new("gpt4", "a"),
        ]
    );
}
