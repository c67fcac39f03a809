//! `unfuzzed-relay` -- WebSocket front door for prompt submission.
//!
//! See [`RelayConfig::from_env`] for configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unfuzzed_core::shutdown::shutdown_signal;
use unfuzzed_relay::config::RelayConfig;
use unfuzzed_relay::queue::HttpPromptQueue;
use unfuzzed_relay::router::build_app;
use unfuzzed_relay::state::AppState;
use unfuzzed_relay::ws::{self, WsManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unfuzzed_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env()?;
    tracing::info!(host = %config.host, port = config.port, "Loaded relay configuration");

    let ws_manager = Arc::new(WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        Duration::from_secs(config.heartbeat_secs),
    );

    let state = AppState {
        ws_manager: Arc::clone(&ws_manager),
        queue: Arc::new(HttpPromptQueue::new(reqwest::Client::new(), &config.queue)),
        ack_secret: config.ack_secret.clone().into(),
    };
    let app = build_app(state);

    let host = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting relay");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;
    heartbeat_handle.abort();

    tracing::info!("Graceful shutdown complete");
    Ok(())
}
