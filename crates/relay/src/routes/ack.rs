//! `POST /ack`: the worker reports a finished image.

use axum::body::Bytes;
use axum::extract::ws::Message;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use unfuzzed_core::protocol::{GenerationResponse, JobBody};

use crate::error::{AppError, AppResult};
use crate::schema::{validated, AckSubmission, INVALID_REQUEST, MALFORMED_JSON};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ack", post(ack))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

async fn ack(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    if !is_json(&headers) {
        return Err(AppError::UnsupportedMediaType);
    }

    let value: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest(MALFORMED_JSON.into()))?;
    let submission: AckSubmission =
        validated(value).ok_or_else(|| AppError::BadRequest(INVALID_REQUEST.into()))?;

    if submission.key != *state.ack_secret {
        tracing::warn!(image_id = %submission.image_id, "Ack with incorrect key");
        return Err(AppError::Unauthorized("Incorrect key".into()));
    }

    let conn_id = submission.web_socket_id.to_string();
    let job = JobBody {
        web_socket_id: Some(conn_id.clone()),
        image_id: submission.image_id.to_string(),
        positive_prompt: submission.positive_prompt,
        negative_prompt: submission.negative_prompt,
    };
    let notice = serde_json::to_string(&GenerationResponse::completed(&job))
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if !state.ws_manager.send_to(&conn_id, Message::Text(notice.into())).await {
        return Err(AppError::BadRequest("Websocket does not exist".into()));
    }

    tracing::info!(conn_id = %conn_id, image_id = %job.image_id, "Image ready notice forwarded");
    Ok(StatusCode::OK)
}
