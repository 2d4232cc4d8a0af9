//! In-process webhook sink for integration tests.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use hass_sensor_agent::api::crypto;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";
pub const WEBHOOK_ID: &str = "hook-1";

type Responder = dyn Fn(&Value) -> (StatusCode, String) + Send + Sync;

/// How the sink should behave.
pub struct SinkOptions {
    /// Answer for each decoded webhook request
    pub responder: Box<Responder>,
    /// Status and body for registration calls with a valid token
    pub registration: (StatusCode, String),
    /// Secret used to open encrypted requests
    pub secret: Option<String>,
    /// Pause before answering a webhook request
    pub delay: Duration,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            responder: Box::new(acknowledge),
            registration: (
                StatusCode::CREATED,
                json!({ "webhook_id": WEBHOOK_ID }).to_string(),
            ),
            secret: None,
            delay: Duration::ZERO,
        }
    }
}

/// Accept every request the way a healthy sink does.
pub fn acknowledge(request: &Value) -> (StatusCode, String) {
    match request["type"].as_str() {
        Some("register_sensor") => (StatusCode::OK, json!({ "success": true }).to_string()),
        Some("update_sensor_states") => {
            let mut answer = serde_json::Map::new();
            for item in request["data"].as_array().into_iter().flatten() {
                if let Some(id) = item["unique_id"].as_str() {
                    answer.insert(id.to_string(), json!({ "success": true }));
                }
            }
            (StatusCode::OK, Value::Object(answer).to_string())
        }
        _ => (StatusCode::BAD_REQUEST, String::new()),
    }
}

struct SinkState {
    options: SinkOptions,
    requests: Mutex<Vec<Value>>,
    raw: Mutex<Vec<Value>>,
    registrations: AtomicUsize,
}

/// A running sink bound to a random local port.
pub struct MockSink {
    pub addr: SocketAddr,
    state: Arc<SinkState>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockSink {
    pub async fn start(options: SinkOptions) -> Self {
        let state = Arc::new(SinkState {
            options,
            requests: Mutex::new(Vec::new()),
            raw: Mutex::new(Vec::new()),
            registrations: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/webhook/:id", post(webhook))
            .route("/api/mobile_app/registrations", post(register))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    /// `host:port` of the sink, as a user would type it.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn webhook_url(&self) -> String {
        format!("http://{}/api/webhook/{WEBHOOK_ID}", self.addr)
    }

    /// Decoded (and decrypted) webhook requests in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Webhook request bodies exactly as received.
    pub fn raw_requests(&self) -> Vec<Value> {
        self.state.raw.lock().unwrap().clone()
    }

    pub fn register_count(&self) -> usize {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["type"] == "register_sensor")
            .count()
    }

    /// Number of device registration calls.
    pub fn registrations(&self) -> usize {
        self.state.registrations.load(Ordering::SeqCst)
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn webhook(State(state): State<Arc<SinkState>>, body: Bytes) -> (StatusCode, String) {
    let Ok(raw) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, String::new());
    };
    state.raw.lock().unwrap().push(raw.clone());

    let request = if raw["type"] == "encrypted" {
        let (Some(secret), Some(sealed)) = (
            state.options.secret.as_deref(),
            raw["encrypted_data"].as_str(),
        ) else {
            return (StatusCode::BAD_REQUEST, String::new());
        };
        match crypto::decrypt(secret, sealed)
            .ok()
            .and_then(|plain| serde_json::from_slice::<Value>(&plain).ok())
        {
            Some(inner) => inner,
            None => return (StatusCode::BAD_REQUEST, String::new()),
        }
    } else {
        raw
    };

    state.requests.lock().unwrap().push(request.clone());

    if !state.options.delay.is_zero() {
        tokio::time::sleep(state.options.delay).await;
    }
    (state.options.responder)(&request)
}

async fn register(
    State(state): State<Arc<SinkState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.registrations.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "unauthorized".to_string());
    }
    if serde_json::from_slice::<Value>(&body).is_err() {
        return (StatusCode::BAD_REQUEST, String::new());
    }

    state.options.registration.clone()
}
