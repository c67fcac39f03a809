//! `unfuzzed-worker` library crate.
//!
//! Pulls generation jobs off the remote queue one lease at a time, runs
//! the sampler, uploads the latent, then acknowledges the job twice: once
//! to the relay (best effort) and once to the queue (authoritative).
//! The binary entrypoint lives in `main.rs`.

pub mod acknowledger;
pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod generator;
pub mod processor;
pub mod queue;
pub mod storage;
