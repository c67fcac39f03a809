//! `unfuzzed-worker` -- GPU-side queue consumer.
//!
//! Leases prompts from the remote queue, runs the sampler, uploads the
//! rescaled latent to R2 and acknowledges the job. Configuration is read
//! from the environment; see [`WorkerConfig::from_env`] for the full table.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unfuzzed_core::shutdown::shutdown_signal;
use unfuzzed_worker::acknowledger::DualAcknowledger;
use unfuzzed_worker::config::WorkerConfig;
use unfuzzed_worker::consumer::{Consumer, ConsumerSettings};
use unfuzzed_worker::dead_letter::{DeadLetterSink, FileDeadLetter, LogDeadLetter};
use unfuzzed_worker::generator::ScriptGenerator;
use unfuzzed_worker::processor::JobProcessor;
use unfuzzed_worker::queue::QueueClient;
use unfuzzed_worker::storage::S3ObjectStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unfuzzed_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;

    tracing::info!(
        queue_id = %config.queue.queue_id,
        bucket = %config.storage.bucket,
        sampler = %config.generator.program,
        latent_scale = config.latent_scale,
        max_attempts = config.max_attempts,
        "Worker starting",
    );

    let http = reqwest::Client::new();
    let queue = QueueClient::new(http.clone(), &config.queue);
    let store = S3ObjectStore::connect(&config.storage).await;
    let generator = ScriptGenerator::new(config.generator.clone(), config.work_dir.clone());
    let processor = JobProcessor::new(
        Arc::new(generator),
        Arc::new(store),
        config.latent_scale,
        config.work_dir.clone(),
    );
    let acknowledger = DualAcknowledger::new(
        http,
        config.ack_endpoint.clone(),
        config.ack_secret.clone(),
        queue.clone(),
    );
    let dead_letter: Arc<dyn DeadLetterSink> = match &config.dead_letter_path {
        Some(path) => Arc::new(FileDeadLetter::new(path.clone())),
        None => Arc::new(LogDeadLetter),
    };

    let consumer = Consumer::new(
        queue,
        processor,
        acknowledger,
        dead_letter,
        ConsumerSettings {
            max_attempts: config.max_attempts,
            idle_backoff: config.idle_backoff,
        },
    );

    // An in-flight job is abandoned on shutdown; the queue redelivers it
    // once its lease expires.
    tokio::select! {
        result = consumer.run() => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "Worker stopping");
            }
            result?;
        }
        () = shutdown_signal() => {}
    }

    tracing::info!(
        app_ack_failures = consumer.acknowledger().app_ack_failures(),
        "Worker stopped",
    );
    Ok(())
}
