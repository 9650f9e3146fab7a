//! Purpose: In-process stand-in for the DynamoDB JSON endpoint.
//! Exports: `StubStore`, `StubResponse`, `Recorded`.
//! Role: Records every signed POST and replays scripted responses over real HTTP.
//! Invariants: Binds loopback on an ephemeral port; shuts down on drop.
//! Invariants: An exhausted script answers `{}` with status 200.
#![allow(dead_code)]

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

pub const JSON_1_0: &str = "application/x-amz-json-1.0";

#[derive(Clone, Debug)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl StubResponse {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            content_type: JSON_1_0,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub target: String,
    pub content_type: String,
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct StubState {
    script: VecDeque<StubResponse>,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<StubState>>;

pub struct StubStore {
    pub base_url: String,
    state: Shared,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StubStore {
    pub fn start(script: Vec<StubResponse>) -> Self {
        let state: Shared = Arc::new(Mutex::new(StubState {
            script: script.into(),
            requests: Vec::new(),
        }));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        listener.set_nonblocking(true).expect("nonblocking");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/", post(handle))
            .with_state(state.clone());
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("listener");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = rx.await;
                    })
                    .await
                    .expect("serve");
            });
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown: Some(tx),
            thread: Some(thread),
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Drop for StubStore {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn handle(State(state): State<Shared>, headers: HeaderMap, body: String) -> Response {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let recorded = Recorded {
        target: text("x-amz-target").unwrap_or_default(),
        content_type: text("content-type").unwrap_or_default(),
        authorization: text("authorization").unwrap_or_default(),
        amz_date: text("x-amz-date").unwrap_or_default(),
        security_token: text("x-amz-security-token"),
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    };
    let next = {
        let mut state = state.lock().unwrap_or_else(|poison| poison.into_inner());
        state.requests.push(recorded);
        state.script.pop_front()
    };
    let next = next.unwrap_or_else(|| StubResponse::json(Value::Object(Default::default())));
    let status = StatusCode::from_u16(next.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, next.content_type)], next.body).into_response()
}
