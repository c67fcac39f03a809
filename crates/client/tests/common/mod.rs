//! Shared test doubles for the client integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use unfuzzed_client::error::TransportError;
use unfuzzed_client::transport::{Connector, Frame, Transport};
use unfuzzed_core::protocol::{GenerationResponse, JobBody, PromptRequest, PromptResponse};

/// Produces the inbound frames the relay would send for a request.
pub type Responder = Box<dyn FnMut(&PromptRequest) -> Vec<Frame> + Send>;

/// Fault to inject on the next send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFault {
    Closed,
    Other,
}

/// State shared between a [`ScriptedConnector`] and the transports it opens.
pub struct Script {
    pub connections: u32,
    pub sent: Vec<String>,
    pub next_send_fault: Option<SendFault>,
    pub inbound: VecDeque<Frame>,
    pub responder: Option<Responder>,
}

/// Connector whose transports answer sends from a scripted responder.
#[derive(Clone)]
pub struct ScriptedConnector {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new(responder: Responder) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                connections: 0,
                sent: Vec::new(),
                next_send_fault: None,
                inbound: VecDeque::new(),
                responder: Some(responder),
            })),
        }
    }

    pub fn connections(&self) -> u32 {
        self.script.lock().unwrap().connections
    }

    pub fn sent(&self) -> Vec<String> {
        self.script.lock().unwrap().sent.clone()
    }

    pub fn fail_next_send(&self, fault: SendFault) {
        self.script.lock().unwrap().next_send_fault = Some(fault);
    }

    pub fn push_inbound(&self, frame: Frame) {
        self.script.lock().unwrap().inbound.push_back(frame);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.script.lock().unwrap().connections += 1;
        Ok(Box::new(ScriptedTransport {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let mut script = self.script.lock().unwrap();
        match script.next_send_fault.take() {
            Some(SendFault::Closed) => return Err(TransportError::Closed),
            Some(SendFault::Other) => return Err(TransportError::Other("injected".into())),
            None => {}
        }

        let request: PromptRequest = serde_json::from_str(&text).unwrap();
        script.sent.push(text);
        let replies = match script.responder.as_mut() {
            Some(responder) => responder(&request),
            None => Vec::new(),
        };
        script.inbound.extend(replies);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        self.script
            .lock()
            .unwrap()
            .inbound
            .pop_front()
            .ok_or(TransportError::Closed)
    }
}

pub fn text<T: serde::Serialize>(msg: &T) -> Frame {
    Frame::Text(serde_json::to_string(msg).unwrap())
}

/// Relay behaving correctly: ack the prompt, then report the image done.
pub fn well_behaved(image_id: &'static str) -> Responder {
    Box::new(move |request: &PromptRequest| {
        let job = JobBody {
            web_socket_id: None,
            image_id: image_id.to_string(),
            positive_prompt: request.positive_prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
        };
        vec![
            text(&PromptResponse::accepted(request, image_id.to_string())),
            text(&GenerationResponse::completed(&job)),
        ]
    })
}

/// Serve `blobs` keyed by image id on an ephemeral local port.
///
/// Returns the base URL, e.g. `http://127.0.0.1:53211`.
pub async fn serve_blobs(blobs: HashMap<String, Vec<u8>>) -> String {
    let router = Router::new()
        .route("/{image_id}", get(blob))
        .with_state(Arc::new(blobs));
    serve(router).await
}

/// Serve a store that sends part of every body, then drops the connection.
pub async fn serve_truncated() -> String {
    serve(Router::new().route("/{image_id}", get(truncated_blob))).await
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn blob(
    Path(image_id): Path<String>,
    State(blobs): State<Arc<HashMap<String, Vec<u8>>>>,
) -> Response {
    match blobs.get(&image_id) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn truncated_blob() -> Response {
    use futures::StreamExt;

    let chunks = futures::stream::iter([
        Ok(Bytes::from_static(b"partial container")),
        Err(std::io::Error::other("store went away")),
    ])
    .then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        chunk
    });
    Body::from_stream(chunks).into_response()
}
