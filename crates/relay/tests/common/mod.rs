//! Shared helpers for relay integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use unfuzzed_core::protocol::JobBody;
use unfuzzed_relay::queue::{PromptQueue, QueueError};
use unfuzzed_relay::router::build_app;
use unfuzzed_relay::state::AppState;
use unfuzzed_relay::ws::WsManager;

pub const SECRET: &str = "test-ack-secret";

/// [`PromptQueue`] that keeps jobs in memory, or refuses them all.
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<JobBody>>,
    pub reject: bool,
}

impl RecordingQueue {
    pub fn jobs(&self) -> Vec<JobBody> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptQueue for RecordingQueue {
    async fn enqueue(&self, job: &JobBody) -> Result<(), QueueError> {
        if self.reject {
            return Err(QueueError::Api {
                status: 503,
                body: "queue paused".into(),
            });
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

pub struct TestRelay {
    pub app: Router,
    pub ws_manager: Arc<WsManager>,
    pub queue: Arc<RecordingQueue>,
}

pub fn test_relay(queue: RecordingQueue) -> TestRelay {
    let ws_manager = Arc::new(WsManager::new());
    let queue = Arc::new(queue);
    let state = AppState {
        ws_manager: Arc::clone(&ws_manager),
        queue: queue.clone(),
        ack_secret: SECRET.into(),
    };
    TestRelay {
        app: build_app(state),
        ws_manager,
        queue,
    }
}

/// Serve `app` on an ephemeral local port and return its address.
pub async fn serve(app: Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
