use std::path::PathBuf;

/// Default relay WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.unfuzzed.org/websocket";

/// Default content store serving finished latents.
pub const DEFAULT_DATA_URL: &str = "https://data.unfuzzed.org";

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket endpoint.
    pub ws_url: String,
    /// Content store base URL; latents live at `{data_url}/{image_id}`.
    pub data_url: String,
    /// Directory downloaded latents are written to.
    pub output_dir: PathBuf,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                             |
    /// |-----------------------|-------------------------------------|
    /// | `UNFUZZED_WS_URL`     | `wss://api.unfuzzed.org/websocket`  |
    /// | `UNFUZZED_DATA_URL`   | `https://data.unfuzzed.org`         |
    /// | `UNFUZZED_OUTPUT_DIR` | the system temp directory           |
    pub fn from_env() -> Self {
        let ws_url = std::env::var("UNFUZZED_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.into());
        let data_url =
            std::env::var("UNFUZZED_DATA_URL").unwrap_or_else(|_| DEFAULT_DATA_URL.into());
        let output_dir = std::env::var("UNFUZZED_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Self {
            ws_url,
            data_url,
            output_dir,
        }
    }
}
