//! Two-stage acknowledgment of a finished job.
//!
//! The application ack tells the relay the image is ready so it can notify
//! the waiting client. It is best effort: a lost notice costs one client a
//! result but the latent is already stored. The queue ack retires the
//! lease and is authoritative; if it fails the job would be redelivered and
//! regenerated, so the error is returned to the caller.

use std::sync::atomic::{AtomicU64, Ordering};

use unfuzzed_core::protocol::{AppAck, JobBody};

use crate::error::QueueError;
use crate::queue::QueueClient;

pub struct DualAcknowledger {
    client: reqwest::Client,
    ack_endpoint: String,
    ack_secret: String,
    queue: QueueClient,
    app_ack_failures: AtomicU64,
}

impl DualAcknowledger {
    pub fn new(
        client: reqwest::Client,
        ack_endpoint: String,
        ack_secret: String,
        queue: QueueClient,
    ) -> Self {
        Self {
            client,
            ack_endpoint,
            ack_secret,
            queue,
            app_ack_failures: AtomicU64::new(0),
        }
    }

    /// Number of application acks that failed since startup.
    pub fn app_ack_failures(&self) -> u64 {
        self.app_ack_failures.load(Ordering::Relaxed)
    }

    /// Notify the application, then retire the lease.
    pub async fn ack(&self, job: &JobBody, lease_id: &str) -> Result<(), QueueError> {
        self.notify_application(job).await;
        self.queue.ack(lease_id).await?;
        tracing::info!(image_id = %job.image_id, lease_id, "Job acknowledged");
        Ok(())
    }

    async fn notify_application(&self, job: &JobBody) {
        let body = AppAck {
            job: job.clone(),
            key: self.ack_secret.clone(),
        };

        let result = self.client.post(&self.ack_endpoint).json(&body).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(image_id = %job.image_id, "Application ack delivered");
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                self.app_ack_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    image_id = %job.image_id,
                    status,
                    body = %body,
                    "Application ack rejected",
                );
            }
            Err(e) => {
                self.app_ack_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(image_id = %job.image_id, error = %e, "Application ack failed");
            }
        }
    }
}
