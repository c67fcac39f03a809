//! Request/response correlation over the duplex connection.
//!
//! Every prompt produces exactly two inbound messages, strictly in order:
//!
//! 1. a prompt ack (`txt2img_prompt`) echoing the client's request id and
//!    carrying the image id the backend will produce, then
//! 2. a generation ack (`txt2img_image`) for that image id.
//!
//! The correlator validates each one against what it expects and turns any
//! mismatch into a typed [`ClientError`]. Interleaved requests are not
//! supported; `&mut self` keeps a single request in flight.

use unfuzzed_core::protocol::{
    GenerationResponse, PromptRequest, PromptResponse, MSG_TYPE_IMAGE, MSG_TYPE_PROMPT,
};

use crate::connection::ConnectionManager;
use crate::error::ClientError;
use crate::transport::{Connector, Frame};

pub struct RequestCorrelator {
    connection: ConnectionManager,
}

impl RequestCorrelator {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connection: ConnectionManager::new(connector),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Send a prompt under a fresh correlation id and return that id.
    pub async fn send_request(
        &mut self,
        positive_prompt: &str,
        negative_prompt: &str,
    ) -> Result<String, ClientError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let request = PromptRequest::new(
            request_id.clone(),
            positive_prompt.to_string(),
            negative_prompt.to_string(),
        );
        let json = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(format!("Failed to encode prompt: {e}")))?;

        self.connection.send_text(&json).await?;
        tracing::debug!(request_id = %request_id, "Prompt sent");
        Ok(request_id)
    }

    /// Wait for the prompt ack of `request_id` and return the assigned image id.
    pub async fn await_prompt_ack(&mut self, request_id: &str) -> Result<String, ClientError> {
        let text = self.next_text().await?;
        let msg: PromptResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::Protocol(format!("Malformed prompt response: {e}")))?;
        check_prompt_ack(msg, request_id)
    }

    /// Wait for the generation ack of `image_id`.
    pub async fn await_generation_ack(&mut self, image_id: &str) -> Result<(), ClientError> {
        let text = self.next_text().await?;
        let msg: GenerationResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::Protocol(format!("Malformed generation response: {e}")))?;
        check_generation_ack(msg, image_id)
    }

    /// Run one full exchange and return the image id once it is ready.
    pub async fn submit(
        &mut self,
        positive_prompt: &str,
        negative_prompt: &str,
    ) -> Result<String, ClientError> {
        let request_id = self.send_request(positive_prompt, negative_prompt).await?;
        let image_id = self.await_prompt_ack(&request_id).await?;
        tracing::info!(
            request_id = %request_id,
            image_id = %image_id,
            "Prompt accepted, waiting for latents"
        );
        self.await_generation_ack(&image_id).await?;
        tracing::info!(image_id = %image_id, "Generation finished");
        Ok(image_id)
    }

    async fn next_text(&mut self) -> Result<String, ClientError> {
        match self.connection.receive().await? {
            Frame::Text(text) => Ok(text),
            other => Err(ClientError::Protocol(format!(
                "Expected websocket message of type text, got {}",
                other.kind()
            ))),
        }
    }
}

fn check_prompt_ack(msg: PromptResponse, request_id: &str) -> Result<String, ClientError> {
    match msg.request_id {
        Some(actual) if actual != request_id => {
            return Err(ClientError::Correlation {
                expected: request_id.to_string(),
                actual,
            });
        }
        Some(_) => {}
        // The relay omits the id only when it could not parse the request.
        None if !msg.success => return Err(remote_error(msg.error)),
        None => {
            return Err(ClientError::Protocol(
                "Prompt response is missing requestId".to_string(),
            ));
        }
    }

    if msg.kind != MSG_TYPE_PROMPT {
        return Err(ClientError::Kind {
            expected: MSG_TYPE_PROMPT.to_string(),
            actual: msg.kind,
        });
    }
    if !msg.success {
        return Err(remote_error(msg.error));
    }

    msg.image_id
        .ok_or_else(|| ClientError::Protocol("Prompt response is missing imageId".to_string()))
}

fn check_generation_ack(msg: GenerationResponse, image_id: &str) -> Result<(), ClientError> {
    if msg.image_id != image_id {
        return Err(ClientError::Correlation {
            expected: image_id.to_string(),
            actual: msg.image_id,
        });
    }
    if msg.kind != MSG_TYPE_IMAGE {
        return Err(ClientError::Kind {
            expected: MSG_TYPE_IMAGE.to_string(),
            actual: msg.kind,
        });
    }
    if !msg.success {
        return Err(remote_error(msg.error));
    }
    Ok(())
}

fn remote_error(error: Option<String>) -> ClientError {
    ClientError::Remote(error.unwrap_or_else(|| "remote reported failure without a message".into()))
}
