//! `unfuzzed-relay` library crate.
//!
//! The relay sits between clients and the worker: it accepts prompts over
//! WebSocket, enqueues them as jobs, and forwards the worker's completion
//! notices (`POST /ack`) to the connection that submitted the prompt.

pub mod config;
pub mod error;
pub mod queue;
pub mod router;
pub mod routes;
pub mod schema;
pub mod state;
pub mod ws;
