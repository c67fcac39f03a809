//! Client WebSocket connections.
//!
//! Provides connection tracking, heartbeat pings, the upgrade handler and
//! the prompt intake performed for every inbound text frame.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{handle_prompt, ws_handler};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
