//! Client side of the unfuzzed pipeline.
//!
//! Submits prompts over a persistent WebSocket, correlates the two replies
//! the relay sends for each prompt, then downloads and opens the resulting
//! latent container.

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod fetcher;
pub mod transport;
