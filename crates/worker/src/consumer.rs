//! The worker's pull → process → ack loop.

use std::sync::Arc;
use std::time::Duration;

use crate::acknowledger::DualAcknowledger;
use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::error::{QueueError, WorkerError};
use crate::processor::JobProcessor;
use crate::queue::{Lease, QueueClient};

/// Result of one consumer iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The queue had nothing to lease.
    Idle,
    /// The pull request itself failed.
    PullFailed,
    /// Processing failed; the lease was left to expire.
    Failed { image_id: String },
    /// The job was retired without processing.
    DeadLettered { lease_id: String },
    /// The dead-letter sink refused the job; the lease was left to expire.
    DeadLetterFailed { lease_id: String },
    /// Processed, uploaded and acknowledged.
    Completed { image_id: String },
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    /// Deliveries allowed before a job is dead-lettered.
    pub max_attempts: u32,
    /// Sleep between polls of an empty (or unreachable) queue.
    pub idle_backoff: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            idle_backoff: Duration::from_secs(5),
        }
    }
}

pub struct Consumer {
    queue: QueueClient,
    processor: JobProcessor,
    acknowledger: DualAcknowledger,
    dead_letter: Arc<dyn DeadLetterSink>,
    settings: ConsumerSettings,
}

impl Consumer {
    pub fn new(
        queue: QueueClient,
        processor: JobProcessor,
        acknowledger: DualAcknowledger,
        dead_letter: Arc<dyn DeadLetterSink>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue,
            processor,
            acknowledger,
            dead_letter,
            settings,
        }
    }

    pub fn acknowledger(&self) -> &DualAcknowledger {
        &self.acknowledger
    }

    /// Lease and handle at most one job.
    ///
    /// Only a failed queue ack is returned as an error.
    pub async fn run_once(&self) -> Result<Outcome, WorkerError> {
        let lease = match self.queue.pull().await {
            Ok(Some(lease)) => lease,
            Ok(None) => return Ok(Outcome::Idle),
            Err(QueueError::Malformed {
                lease_id,
                attempts,
                body,
                reason,
            }) => {
                let letter = DeadLetter {
                    lease_id,
                    attempts,
                    body,
                    reason: format!("malformed job body: {reason}"),
                    dead_lettered_at: chrono::Utc::now(),
                };
                return self.retire(letter).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Queue pull failed");
                return Ok(Outcome::PullFailed);
            }
        };

        if lease.attempts > self.settings.max_attempts {
            return self.retire(exhausted(&lease, self.settings.max_attempts)).await;
        }

        let image_id = lease.job.image_id.clone();
        tracing::info!(
            image_id = %image_id,
            lease_id = %lease.lease_id,
            attempts = lease.attempts,
            "Processing job",
        );

        if let Err(e) = self.processor.process(&lease.job).await {
            tracing::error!(image_id = %image_id, lease_id = %lease.lease_id, error = %e, "Job failed");
            return Ok(Outcome::Failed { image_id });
        }

        self.acknowledger
            .ack(&lease.job, &lease.lease_id)
            .await
            .map_err(|source| WorkerError::QueueAck {
                lease_id: lease.lease_id.clone(),
                source,
            })?;

        Ok(Outcome::Completed { image_id })
    }

    /// Run until a queue ack fails.
    pub async fn run(&self) -> Result<(), WorkerError> {
        loop {
            match self.run_once().await? {
                Outcome::Idle => {
                    tracing::debug!("Queue empty");
                    tokio::time::sleep(self.settings.idle_backoff).await;
                }
                Outcome::PullFailed => {
                    tokio::time::sleep(self.settings.idle_backoff).await;
                }
                Outcome::Failed { .. }
                | Outcome::DeadLettered { .. }
                | Outcome::DeadLetterFailed { .. }
                | Outcome::Completed { .. } => {}
            }
        }
    }

    /// Hand `letter` to the sink and retire its lease.
    ///
    /// If the sink fails the lease is left to expire so the job is not lost.
    async fn retire(&self, letter: DeadLetter) -> Result<Outcome, WorkerError> {
        if let Err(e) = self.dead_letter.store(&letter).await {
            tracing::error!(lease_id = %letter.lease_id, error = %e, "Dead-letter sink failed");
            return Ok(Outcome::DeadLetterFailed {
                lease_id: letter.lease_id,
            });
        }

        self.queue
            .ack(&letter.lease_id)
            .await
            .map_err(|source| WorkerError::QueueAck {
                lease_id: letter.lease_id.clone(),
                source,
            })?;

        Ok(Outcome::DeadLettered {
            lease_id: letter.lease_id,
        })
    }
}

fn exhausted(lease: &Lease, max_attempts: u32) -> DeadLetter {
    DeadLetter {
        lease_id: lease.lease_id.clone(),
        attempts: lease.attempts,
        body: serde_json::to_string(&lease.job).unwrap_or_default(),
        reason: format!("attempt limit of {max_attempts} exceeded"),
        dead_lettered_at: chrono::Utc::now(),
    }
}
