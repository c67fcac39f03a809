use std::sync::Arc;

use crate::queue::PromptQueue;
use crate::ws::WsManager;

/// Shared state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Open client connections, keyed by connection id.
    pub ws_manager: Arc<WsManager>,
    pub queue: Arc<dyn PromptQueue>,
    pub ack_secret: Arc<str>,
}
