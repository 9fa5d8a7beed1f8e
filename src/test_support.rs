//! In-process mock backend for HTTP-level tests.

use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use crate::init::Config;

/// What the mock saw.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub hits: AtomicUsize,
    pub bodies: Mutex<Vec<Value>>,
}

impl Recorder {
    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub(crate) fn last_body(&self) -> Option<Value> {
        self.bodies.lock().unwrap().last().cloned()
    }
}

/// Serve `router` on an ephemeral port; returns the `/api` base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api", addr)
}

/// A base URL nothing is listening on.
pub(crate) async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

pub(crate) fn config_for(api_url: &str) -> Config {
    Config {
        api_url: api_url.to_string(),
        ..Config::default()
    }
}

/// Event-stream body carrying `deltas`, bracketed like the real backend.
pub(crate) fn event_body(deltas: &[&str]) -> String {
    let mut body = String::from("data: {\"type\":\"start\"}\n\n");
    for delta in deltas {
        let record = serde_json::json!({ "type": "text-delta", "id": "0", "delta": delta });
        body.push_str(&format!("data: {}\n\n", record));
    }
    body.push_str("data: {\"type\":\"finish\"}\n\ndata: [DONE]\n\n");
    body
}

/// JSON POST route answering hit `n` with `responses[min(n, len - 1)]`.
pub(crate) fn scripted_route(
    path: &str,
    responses: Vec<(StatusCode, String)>,
) -> (Router, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let responses = Arc::new(responses);

    let handler = {
        let recorder = recorder.clone();
        move |axum::Json(body): axum::Json<Value>| {
            let recorder = recorder.clone();
            let responses = responses.clone();
            async move {
                let hit = recorder.hits.fetch_add(1, Ordering::SeqCst);
                recorder.bodies.lock().unwrap().push(body);
                responses[hit.min(responses.len() - 1)].clone()
            }
        }
    };

    (Router::new().route(path, post(handler)), recorder)
}
