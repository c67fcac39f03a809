use unfuzzed_core::config::Env;
pub use unfuzzed_core::config::{ConfigError, DEFAULT_QUEUE_API_URL};

/// Where accepted prompts are enqueued.
#[derive(Debug, Clone)]
pub struct QueueTarget {
    pub api_url: String,
    pub account_id: String,
    pub queue_id: String,
    pub token: String,
}

/// Relay configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8787`).
    pub port: u16,
    /// Secret the worker must present on `/ack`.
    pub ack_secret: String,
    pub queue: QueueTarget,
    /// Seconds between WebSocket pings (default: `30`).
    pub heartbeat_secs: u64,
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                 | Default                                |
    /// |-------------------------|----------------------------------------|
    /// | `HOST`                  | `0.0.0.0`                              |
    /// | `PORT`                  | `8787`                                 |
    /// | `ACK_SECRET_KEY`        | required                               |
    /// | `CLOUDFLARE_ACCOUNT_ID` | required                               |
    /// | `CLOUDFLARE_QUEUE_ID`   | required                               |
    /// | `CLOUDFLARE_TOKEN`      | required                               |
    /// | `QUEUE_API_URL`         | `https://api.cloudflare.com/client/v4` |
    /// | `HEARTBEAT_SECS`        | `30`                                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        Ok(Self {
            host: env.get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: env.parsed("PORT", 8787, "a valid u16")?,
            ack_secret: env.required("ACK_SECRET_KEY")?,
            queue: QueueTarget {
                api_url: env
                    .get("QUEUE_API_URL")
                    .unwrap_or_else(|| DEFAULT_QUEUE_API_URL.into()),
                account_id: env.required("CLOUDFLARE_ACCOUNT_ID")?,
                queue_id: env.required("CLOUDFLARE_QUEUE_ID")?,
                token: env.required("CLOUDFLARE_TOKEN")?,
            },
            // `tokio::time::interval` panics on a zero period.
            heartbeat_secs: env.positive_secs("HEARTBEAT_SECS", 30)?,
        })
    }
}
