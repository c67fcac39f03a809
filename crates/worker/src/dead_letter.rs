//! Destination for jobs the worker gives up on.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// A job retired without being processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub lease_id: String,
    pub attempts: u32,
    /// Message body exactly as leased.
    pub body: String,
    pub reason: String,
    pub dead_lettered_at: chrono::DateTime<chrono::Utc>,
}

/// Stores dead letters. The job is queue-acked only after `store` succeeds.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn store(&self, letter: &DeadLetter) -> anyhow::Result<()>;
}

/// Logs each dead letter at `error` level and keeps nothing.
pub struct LogDeadLetter;

#[async_trait]
impl DeadLetterSink for LogDeadLetter {
    async fn store(&self, letter: &DeadLetter) -> anyhow::Result<()> {
        tracing::error!(
            lease_id = %letter.lease_id,
            attempts = letter.attempts,
            reason = %letter.reason,
            body = %letter.body,
            "Job dead-lettered",
        );
        Ok(())
    }
}

/// Appends each dead letter as one JSON line to a file.
pub struct FileDeadLetter {
    path: PathBuf,
}

impl FileDeadLetter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DeadLetterSink for FileDeadLetter {
    async fn store(&self, letter: &DeadLetter) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(letter)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::error!(
            lease_id = %letter.lease_id,
            attempts = letter.attempts,
            path = %self.path.display(),
            "Job dead-lettered",
        );
        Ok(())
    }
}
