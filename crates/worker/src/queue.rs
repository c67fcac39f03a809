//! REST client for the remote job queue.
//!
//! Jobs are leased with `POST .../messages/pull` (one at a time) and
//! retired with `POST .../messages/ack`. A lease that is never acked
//! becomes visible again once its visibility timeout lapses, and the
//! queue bumps its `attempts` counter on every redelivery.

use serde::Deserialize;
use unfuzzed_core::protocol::JobBody;

use crate::config::QueueConfig;
use crate::error::QueueError;

/// A job leased from the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub lease_id: String,
    /// Delivery count reported by the queue, starting at 1.
    pub attempts: u32,
    pub job: JobBody,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    result: Option<PullResult>,
}

#[derive(Debug, Deserialize)]
struct PullResult {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    lease_id: String,
    /// The queue hands the job back as a JSON document encoded in a string.
    body: String,
    // Reported as a JSON number, which may carry a fractional part.
    #[serde(default = "first_attempt")]
    attempts: f64,
}

fn first_attempt() -> f64 {
    1.0
}

/// HTTP client for one queue.
#[derive(Clone)]
pub struct QueueClient {
    client: reqwest::Client,
    messages_url: String,
    token: String,
    visibility_timeout_ms: u64,
}

impl QueueClient {
    /// Create a queue client reusing an existing [`reqwest::Client`].
    pub fn new(client: reqwest::Client, config: &QueueConfig) -> Self {
        Self {
            client,
            messages_url: format!(
                "{}/accounts/{}/queues/{}/messages",
                config.api_url.trim_end_matches('/'),
                config.account_id,
                config.queue_id
            ),
            token: config.token.clone(),
            visibility_timeout_ms: config.visibility_timeout_ms,
        }
    }

    /// Lease at most one job. `Ok(None)` means the queue is empty.
    pub async fn pull(&self) -> Result<Option<Lease>, QueueError> {
        let body = serde_json::json!({
            "visibility_timeout": self.visibility_timeout_ms,
            "batch_size": 1,
        });

        let response = self
            .client
            .post(format!("{}/pull", self.messages_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let parsed: PullResponse = Self::ensure_success(response).await?.json().await?;
        let Some(message) = parsed
            .result
            .and_then(|result| result.messages.into_iter().next())
        else {
            return Ok(None);
        };

        let attempts = message.attempts.max(1.0) as u32;
        match serde_json::from_str::<JobBody>(&message.body) {
            Ok(job) => Ok(Some(Lease {
                lease_id: message.lease_id,
                attempts,
                job,
            })),
            Err(e) => Err(QueueError::Malformed {
                lease_id: message.lease_id,
                attempts,
                body: message.body,
                reason: e.to_string(),
            }),
        }
    }

    /// Retire a lease so the job is never redelivered.
    pub async fn ack(&self, lease_id: &str) -> Result<(), QueueError> {
        let body = serde_json::json!({
            "acks": [{ "lease_id": lease_id }],
        });

        let response = self
            .client
            .post(format!("{}/ack", self.messages_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, QueueError> {
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
        Ok(response)
    }
}
