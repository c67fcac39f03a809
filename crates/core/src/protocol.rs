//! Wire types shared by the client, the relay and the worker.
//!
//! Three families of JSON messages cross process boundaries:
//!
//! * WebSocket text frames between client and relay ([`PromptRequest`],
//!   [`PromptResponse`], [`GenerationResponse`]), all using camelCase keys
//!   and a `"type"` discriminator.
//! * The queue message body the relay enqueues and the worker consumes
//!   ([`JobBody`]).
//! * The application-level completion notice the worker posts back to the
//!   relay ([`AppAck`]).

use serde::{Deserialize, Serialize};

/// `type` of a prompt submission and of its acknowledgment.
pub const MSG_TYPE_PROMPT: &str = "txt2img_prompt";

/// `type` of the generation-finished notification.
pub const MSG_TYPE_IMAGE: &str = "txt2img_image";

/// Client → relay: submit a prompt for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    #[serde(rename = "type")]
    pub kind: String,
    /// Correlation id chosen by the client, echoed in the prompt ack.
    pub request_id: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
}

impl PromptRequest {
    pub fn new(request_id: String, positive_prompt: String, negative_prompt: String) -> Self {
        Self {
            kind: MSG_TYPE_PROMPT.to_string(),
            request_id,
            positive_prompt,
            negative_prompt,
        }
    }
}

/// Relay → client, first reply: the prompt was (or was not) queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    #[serde(rename = "type")]
    pub kind: String,
    /// Echo of [`PromptRequest::request_id`]. Absent when the relay could
    /// not parse the request at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub success: bool,
    /// Identifier of the image the backend will produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl PromptResponse {
    /// Successful prompt ack carrying the assigned image id.
    pub fn accepted(request: &PromptRequest, image_id: String) -> Self {
        Self {
            kind: MSG_TYPE_PROMPT.to_string(),
            request_id: Some(request.request_id.clone()),
            success: true,
            image_id: Some(image_id),
            error: None,
            positive_prompt: Some(request.positive_prompt.clone()),
            negative_prompt: Some(request.negative_prompt.clone()),
        }
    }

    /// Failed prompt ack.
    pub fn rejected(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            kind: MSG_TYPE_PROMPT.to_string(),
            request_id,
            success: false,
            image_id: None,
            error: Some(error.into()),
            positive_prompt: None,
            negative_prompt: None,
        }
    }
}

/// Relay → client, second reply: the latent for `image_id` is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub image_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl GenerationResponse {
    pub fn completed(job: &JobBody) -> Self {
        Self {
            kind: MSG_TYPE_IMAGE.to_string(),
            image_id: job.image_id.clone(),
            success: true,
            error: None,
            positive_prompt: Some(job.positive_prompt.clone()),
            negative_prompt: Some(job.negative_prompt.clone()),
        }
    }
}

/// Queue message body: one generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBody {
    /// Relay connection that should receive the completion notice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket_id: Option<String>,
    pub image_id: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
}

/// Worker → relay completion notice: the job fields plus the shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAck {
    #[serde(flatten)]
    pub job: JobBody,
    pub key: String,
}
