//! `objwatch-agent` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod error;
pub mod host;
pub mod liveness;
pub mod ordering;
pub mod orchestrator;
pub mod session;
