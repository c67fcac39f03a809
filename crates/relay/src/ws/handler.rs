use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use unfuzzed_core::protocol::{JobBody, PromptRequest, PromptResponse};

use crate::error::AppError;
use crate::queue::PromptQueue;
use crate::schema::{validated, PromptSubmission, INVALID_REQUEST, MALFORMED_JSON};
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// Sent when an accepted prompt could not be enqueued.
const QUEUE_UNAVAILABLE: &str = "Failed to queue request";

/// HTTP handler that upgrades the connection to WebSocket.
///
/// Plain HTTP requests get `426 Upgrade Required`.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state.ws_manager, state.queue))
            .into_response(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected non-WebSocket request");
            AppError::UpgradeRequired.into_response()
        }
    }
}

/// Manage one connection after upgrade.
///
/// Outbound messages (prompt acks and completion notices alike) go through
/// the manager's channel so a single sender task owns the sink.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, queue: Arc<dyn PromptQueue>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = handle_prompt(queue.as_ref(), &conn_id, text.as_str()).await;
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        ws_manager.send_to(&conn_id, Message::Text(json.into())).await;
                    }
                    Err(e) => {
                        tracing::error!(conn_id = %conn_id, error = %e, "Cannot encode reply");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Validate one inbound prompt frame, enqueue it and build the reply.
///
/// `conn_id` is recorded on the job so the completion notice can be routed
/// back to this connection.
pub async fn handle_prompt(queue: &dyn PromptQueue, conn_id: &str, text: &str) -> PromptResponse {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return PromptResponse::rejected(None, MALFORMED_JSON);
    };

    let echoed_id = value
        .get("requestId")
        .and_then(Value::as_str)
        .map(String::from);

    let Some(submission) = validated::<PromptSubmission>(value) else {
        return PromptResponse::rejected(echoed_id, INVALID_REQUEST);
    };

    let request = PromptRequest {
        kind: submission.kind,
        request_id: submission.request_id.to_string(),
        positive_prompt: submission.positive_prompt,
        negative_prompt: submission.negative_prompt,
    };
    let job = JobBody {
        web_socket_id: Some(conn_id.to_string()),
        image_id: uuid::Uuid::new_v4().to_string(),
        positive_prompt: request.positive_prompt.clone(),
        negative_prompt: request.negative_prompt.clone(),
    };

    if let Err(e) = queue.enqueue(&job).await {
        tracing::error!(conn_id, request_id = %request.request_id, error = %e, "Enqueue failed");
        return PromptResponse::rejected(Some(request.request_id), QUEUE_UNAVAILABLE);
    }

    tracing::info!(conn_id, image_id = %job.image_id, "Prompt queued");
    PromptResponse::accepted(&request, job.image_id)
}
