use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Spawn a task pinging every client each `interval`, keeping idle
/// connections open through proxies.
pub fn start_heartbeat(ws_manager: Arc<WsManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let count = ws_manager.connection_count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            ws_manager.ping_all().await;
        }
    })
}
