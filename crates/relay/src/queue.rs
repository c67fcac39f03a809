//! Outbound side of the job queue.

use async_trait::async_trait;
use unfuzzed_core::protocol::JobBody;

use crate::config::QueueTarget;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Queue API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Accepts jobs for the worker.
#[async_trait]
pub trait PromptQueue: Send + Sync {
    async fn enqueue(&self, job: &JobBody) -> Result<(), QueueError>;
}

/// [`PromptQueue`] backed by the queue REST API.
pub struct HttpPromptQueue {
    client: reqwest::Client,
    messages_url: String,
    token: String,
}

impl HttpPromptQueue {
    pub fn new(client: reqwest::Client, target: &QueueTarget) -> Self {
        Self {
            client,
            messages_url: format!(
                "{}/accounts/{}/queues/{}/messages",
                target.api_url.trim_end_matches('/'),
                target.account_id,
                target.queue_id
            ),
            token: target.token.clone(),
        }
    }
}

#[async_trait]
impl PromptQueue for HttpPromptQueue {
    async fn enqueue(&self, job: &JobBody) -> Result<(), QueueError> {
        let response = self
            .client
            .post(&self.messages_url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "body": job }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(QueueError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
