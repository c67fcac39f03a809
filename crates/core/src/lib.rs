//! Shared building blocks for the unfuzzed dispatch pipeline.
//!
//! Holds everything the client, the relay and the worker must agree on:
//! the WebSocket wire messages, the queue job body, the latent container
//! format, the age-confirmation gate, and the environment and shutdown
//! plumbing both long-running binaries use.

pub mod age_check;
pub mod config;
pub mod error;
pub mod latent;
pub mod protocol;
pub mod shutdown;
