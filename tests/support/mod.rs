//! Stand-in upstream provider served by axum on an ephemeral port.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

/// Canned HTTP reply: status and raw body.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn raw(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn anthropic_text(text: &str) -> Self {
        Self::json(
            StatusCode::OK,
            &serde_json::json!({"content": [{"type": "text", "text": text}]}),
        )
    }

    pub fn openai_text(text: &str) -> Self {
        Self::json(
            StatusCode::OK,
            &serde_json::json!({"choices": [{"message": {"role": "assistant", "content": text}}]}),
        )
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(
            status,
            &serde_json::json!({"error": {"type": "error", "message": message}}),
        )
    }
}

/// A request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub headers: HeaderMap,
    pub body: Value,
}

struct UpstreamState {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    requests: Mutex<Vec<Recorded>>,
}

/// Handle to a running stand-in upstream.
#[derive(Clone)]
pub struct Upstream {
    pub url: String,
    state: Arc<UpstreamState>,
}

impl Upstream {
    /// Serve `replies` in order, then keep repeating `fallback`.
    pub async fn start(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self::start_with_delay(replies, fallback, Duration::ZERO).await
    }

    pub async fn start_with_delay(replies: Vec<Reply>, fallback: Reply, delay: Duration) -> Self {
        let state = Arc::new(UpstreamState {
            replies: Mutex::new(replies.into()),
            fallback,
            delay,
            requests: Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route("/v1/messages", post(handle))
            .route("/v1/chat/completions", post(handle))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind upstream");
        let addr = listener.local_addr().expect("No local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Upstream crashed");
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

async fn handle(
    State(state): State<Arc<UpstreamState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    state
        .requests
        .lock()
        .unwrap()
        .push(Recorded { headers, body });

    let reply = state
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| state.fallback.clone());

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    (
        reply.status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
}

/// An address nothing is listening on.
pub async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1/chat/completions")
}
