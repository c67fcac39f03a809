//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use unfuzzed_core::config::Env;
pub use unfuzzed_core::config::{ConfigError, DEFAULT_QUEUE_API_URL};
use unfuzzed_core::latent::DEFAULT_LATENT_SCALE;

/// Queue REST API access.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub api_url: String,
    pub account_id: String,
    pub queue_id: String,
    /// Bearer token for the queue API.
    pub token: String,
    /// How long a pulled message stays invisible to other consumers.
    pub visibility_timeout_ms: u64,
}

/// S3-compatible object store holding finished latents.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint_url: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// External sampler command and the settings handed to it.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub steps: u32,
    pub guidance_scale: f32,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub generator: GeneratorConfig,
    /// Relay endpoint receiving the application-level ack.
    pub ack_endpoint: String,
    /// Shared secret included in every application-level ack.
    pub ack_secret: String,
    pub latent_scale: f32,
    pub work_dir: PathBuf,
    pub idle_backoff: Duration,
    pub max_attempts: u32,
    /// Append dead letters here as JSON lines; log-only when unset.
    pub dead_letter_path: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default                                     |
    /// |--------------------------|---------------------------------------------|
    /// | `CLOUDFLARE_ACCOUNT_ID`  | required                                    |
    /// | `CLOUDFLARE_TOKEN`       | required                                    |
    /// | `CLOUDFLARE_QUEUE_ID`    | required                                    |
    /// | `QUEUE_API_URL`          | `https://api.cloudflare.com/client/v4`      |
    /// | `VISIBILITY_TIMEOUT_MS`  | `10000`                                     |
    /// | `R2_BUCKET_NAME`         | required                                    |
    /// | `R2_ENDPOINT_URL`        | `https://{account}.r2.cloudflarestorage.com`|
    /// | `R2_ACCESS_KEY_ID`       | required                                    |
    /// | `R2_SECRET_ACCESS_KEY`   | required                                    |
    /// | `ACK_ENDPOINT`           | required                                    |
    /// | `ACK_SECRET_KEY`         | required                                    |
    /// | `GENERATOR_COMMAND`      | required, split on whitespace               |
    /// | `GENERATOR_TIMEOUT_SECS` | `300`                                       |
    /// | `SAMPLER_STEPS`          | `12`                                        |
    /// | `GUIDANCE_SCALE`         | `5.0`                                       |
    /// | `LATENT_SCALE`           | `1 / 0.13025`                               |
    /// | `WORK_DIR`               | `.`                                         |
    /// | `IDLE_BACKOFF_SECS`      | `5`                                         |
    /// | `MAX_ATTEMPTS`           | `5`                                         |
    /// | `DEAD_LETTER_PATH`       | unset                                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let account_id = env.required("CLOUDFLARE_ACCOUNT_ID")?;
        let queue = QueueConfig {
            api_url: env
                .get("QUEUE_API_URL")
                .unwrap_or_else(|| DEFAULT_QUEUE_API_URL.into()),
            queue_id: env.required("CLOUDFLARE_QUEUE_ID")?,
            token: env.required("CLOUDFLARE_TOKEN")?,
            visibility_timeout_ms: env.parsed("VISIBILITY_TIMEOUT_MS", 10_000, "an integer")?,
            account_id: account_id.clone(),
        };

        let storage = StorageConfig {
            endpoint_url: env
                .get("R2_ENDPOINT_URL")
                .unwrap_or_else(|| format!("https://{account_id}.r2.cloudflarestorage.com")),
            bucket: env.required("R2_BUCKET_NAME")?,
            access_key_id: env.required("R2_ACCESS_KEY_ID")?,
            secret_access_key: env.required("R2_SECRET_ACCESS_KEY")?,
        };

        let command = env.required("GENERATOR_COMMAND")?;
        let mut words = command.split_whitespace().map(String::from);
        let program = words.next().ok_or(ConfigError::Invalid {
            name: "GENERATOR_COMMAND",
            expected: "a non-empty command line",
            value: command.clone(),
        })?;
        let generator = GeneratorConfig {
            program,
            args: words.collect(),
            timeout: Duration::from_secs(env.positive_secs("GENERATOR_TIMEOUT_SECS", 300)?),
            steps: env.parsed("SAMPLER_STEPS", 12, "an integer")?,
            guidance_scale: env.parsed("GUIDANCE_SCALE", 5.0, "a number")?,
        };

        let latent_scale: f32 = env.parsed("LATENT_SCALE", DEFAULT_LATENT_SCALE, "a number")?;
        if !latent_scale.is_finite() || latent_scale <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "LATENT_SCALE",
                expected: "a positive number",
                value: latent_scale.to_string(),
            });
        }

        Ok(Self {
            queue,
            storage,
            generator,
            ack_endpoint: env.required("ACK_ENDPOINT")?,
            ack_secret: env.required("ACK_SECRET_KEY")?,
            latent_scale,
            work_dir: env.get("WORK_DIR").map(PathBuf::from).unwrap_or_else(|| ".".into()),
            idle_backoff: Duration::from_secs(env.parsed(
                "IDLE_BACKOFF_SECS",
                5,
                "a number of seconds",
            )?),
            max_attempts: env.parsed("MAX_ATTEMPTS", 5, "an integer")?,
            dead_letter_path: env.get("DEAD_LETTER_PATH").map(PathBuf::from),
        })
    }
}
