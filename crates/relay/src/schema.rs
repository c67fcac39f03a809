//! Validated shapes of inbound relay messages.
//!
//! Fields are deserialized first (a missing or mistyped field fails
//! there), then [`Validate`] enforces length limits.

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub const MALFORMED_JSON: &str = "Request contained malformed json";
pub const INVALID_REQUEST: &str = "Invalid request";

/// Prompt submitted over the WebSocket.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PromptSubmission {
    #[serde(rename = "type")]
    #[validate(length(max = 50))]
    pub kind: String,
    pub request_id: Uuid,
    #[validate(length(max = 1000))]
    pub positive_prompt: String,
    #[validate(length(max = 1000))]
    pub negative_prompt: String,
}

/// Completion notice posted by the worker to `/ack`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AckSubmission {
    pub key: String,
    pub web_socket_id: Uuid,
    pub image_id: Uuid,
    #[validate(length(max = 1000))]
    pub positive_prompt: String,
    #[validate(length(max = 1000))]
    pub negative_prompt: String,
}

/// Decode `value` as `T` and run its validation rules.
pub fn validated<T>(value: serde_json::Value) -> Option<T>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let parsed: T = serde_json::from_value(value).ok()?;
    parsed.validate().ok()?;
    Some(parsed)
}
