use unfuzzed_core::error::CoreError;

/// Errors from the queue REST API.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The queue API returned a non-2xx status code.
    #[error("Queue API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A leased message whose body is not a valid job.
    #[error("Malformed message on lease {lease_id}: {reason}")]
    Malformed {
        lease_id: String,
        attempts: u32,
        body: String,
        reason: String,
    },
}

/// Errors that abort processing of a single job.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The job itself is unusable (e.g. an unsafe image id).
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// The sampler failed or produced no latent.
    #[error("Latent generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Container(#[from] CoreError),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end the consumer loop.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The queue refused an ack. Continuing would reprocess finished jobs.
    #[error("Queue ack failed for lease {lease_id}: {source}")]
    QueueAck {
        lease_id: String,
        #[source]
        source: QueueError,
    },
}
