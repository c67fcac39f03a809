//! Shared fixtures for the worker integration tests.
//!
//! [`FakeCloud`] is an in-process axum server standing in for both the
//! queue REST API and the relay's `/ack` endpoint, recording every call in
//! arrival order.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use unfuzzed_core::latent::Tensor;
use unfuzzed_core::protocol::JobBody;
use unfuzzed_worker::acknowledger::DualAcknowledger;
use unfuzzed_worker::config::QueueConfig;
use unfuzzed_worker::consumer::{Consumer, ConsumerSettings};
use unfuzzed_worker::dead_letter::{DeadLetter, DeadLetterSink};
use unfuzzed_worker::error::ProcessError;
use unfuzzed_worker::generator::LatentGenerator;
use unfuzzed_worker::processor::JobProcessor;
use unfuzzed_worker::queue::QueueClient;
use unfuzzed_worker::storage::ObjectStore;

pub const SECRET: &str = "shared-secret";
pub const SCALE: f32 = 2.0;

// ---------------------------------------------------------------------------
// Fake queue API + relay ack endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

struct CloudState {
    calls: Vec<Call>,
    pulls: VecDeque<(StatusCode, Value)>,
    app_ack_status: StatusCode,
    queue_ack_status: StatusCode,
}

#[derive(Clone)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
    pub base_url: String,
}

impl FakeCloud {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(CloudState {
            calls: Vec::new(),
            pulls: VecDeque::new(),
            app_ack_status: StatusCode::OK,
            queue_ack_status: StatusCode::OK,
        }));

        let router = Router::new()
            .route("/accounts/{account}/queues/{queue}/messages/pull", post(pull))
            .route("/accounts/{account}/queues/{queue}/messages/ack", post(queue_ack))
            .route("/ack", post(app_ack))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            state,
            base_url: format!("http://{addr}"),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            api_url: self.base_url.clone(),
            account_id: "acct".into(),
            queue_id: "q1".into(),
            token: "tok".into(),
            visibility_timeout_ms: 10_000,
        }
    }

    pub fn queue_client(&self) -> QueueClient {
        QueueClient::new(reqwest::Client::new(), &self.queue_config())
    }

    pub fn ack_endpoint(&self) -> String {
        format!("{}/ack", self.base_url)
    }

    /// Queue a successful pull response.
    pub fn push_pull(&self, body: Value) {
        self.push_pull_status(StatusCode::OK, body);
    }

    pub fn push_pull_status(&self, status: StatusCode, body: Value) {
        self.state.lock().unwrap().pulls.push_back((status, body));
    }

    pub fn set_app_ack_status(&self, status: StatusCode) {
        self.state.lock().unwrap().app_ack_status = status;
    }

    pub fn set_queue_ack_status(&self, status: StatusCode) {
        self.state.lock().unwrap().queue_ack_status = status;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Every call except pulls, in arrival order.
    pub fn ack_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !c.path.ends_with("/pull"))
            .collect()
    }
}

fn record(state: &Mutex<CloudState>, uri: &Uri, headers: &HeaderMap, body: &Bytes) {
    let body = serde_json::from_slice(body).unwrap_or(Value::Null);
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.lock().unwrap().calls.push(Call {
        path: uri.path().to_string(),
        authorization,
        body,
    });
}

async fn pull(
    State(state): State<Arc<Mutex<CloudState>>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &uri, &headers, &body);
    let next = state.lock().unwrap().pulls.pop_front();
    match next {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => Json(empty_pull()).into_response(),
    }
}

async fn queue_ack(
    State(state): State<Arc<Mutex<CloudState>>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &uri, &headers, &body);
    let status = state.lock().unwrap().queue_ack_status;
    (status, Json(json!({ "success": status.is_success() }))).into_response()
}

async fn app_ack(
    State(state): State<Arc<Mutex<CloudState>>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &uri, &headers, &body);
    let status = state.lock().unwrap().app_ack_status;
    (status, "ack").into_response()
}

pub fn empty_pull() -> Value {
    json!({ "success": true, "result": { "messages": [] } })
}

/// A pull response holding one message whose body is `job` encoded as a string.
pub fn leased(lease_id: &str, attempts: u32, job: &Value) -> Value {
    json!({
        "success": true,
        "result": {
            "messages": [{
                "lease_id": lease_id,
                "body": job.to_string(),
                "attempts": attempts,
            }]
        }
    })
}

pub fn cat_job() -> Value {
    json!({ "positivePrompt": "a cat", "negativePrompt": "", "imageId": "IMG1" })
}

// ---------------------------------------------------------------------------
// Generator, store and dead-letter doubles
// ---------------------------------------------------------------------------

pub fn raw_latent() -> Tensor {
    Tensor::new(vec![1, 4, 1, 2], vec![0.5, -1.0, 2.0, 0.0, 1.5, -0.25, 3.0, 4.0]).unwrap()
}

pub struct FakeGenerator {
    pub calls: AtomicU32,
    fail: bool,
}

impl FakeGenerator {
    pub fn ok() -> Self {
        Self { calls: AtomicU32::new(0), fail: false }
    }

    pub fn failing() -> Self {
        Self { calls: AtomicU32::new(0), fail: true }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LatentGenerator for FakeGenerator {
    async fn generate(&self, _job: &JobBody) -> Result<Tensor, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProcessError::Generation("CUDA out of memory".into()));
        }
        Ok(raw_latent())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self { objects: Mutex::default(), fail: true }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), ProcessError> {
        if self.fail {
            return Err(ProcessError::Upload("bucket unavailable".into()));
        }
        let bytes = tokio::fs::read(path).await?;
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub letters: Mutex<Vec<DeadLetter>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingSink {
    async fn store(&self, letter: &DeadLetter) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("sink offline");
        }
        self.letters.lock().unwrap().push(letter.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Consumer harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub cloud: FakeCloud,
    pub generator: Arc<FakeGenerator>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub consumer: Consumer,
    pub work_dir: tempfile::TempDir,
}

pub async fn harness(generator: FakeGenerator, store: MemoryStore, sink: RecordingSink) -> Harness {
    let cloud = FakeCloud::start().await;
    let work_dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(generator);
    let store = Arc::new(store);
    let sink = Arc::new(sink);

    let http = reqwest::Client::new();
    let queue = QueueClient::new(http.clone(), &cloud.queue_config());
    let processor = JobProcessor::new(
        generator.clone(),
        store.clone(),
        SCALE,
        work_dir.path().to_path_buf(),
    );
    let acknowledger =
        DualAcknowledger::new(http, cloud.ack_endpoint(), SECRET.into(), queue.clone());
    let consumer = Consumer::new(
        queue,
        processor,
        acknowledger,
        sink.clone(),
        ConsumerSettings {
            max_attempts: 3,
            idle_backoff: Duration::from_millis(10),
        },
    );

    Harness {
        cloud,
        generator,
        store,
        sink,
        consumer,
        work_dir,
    }
}

pub async fn default_harness() -> Harness {
    harness(FakeGenerator::ok(), MemoryStore::default(), RecordingSink::default()).await
}
