//! Shared domain types for the objwatch listener runner.
//!
//! Pure data and constants only: no I/O, no async runtime.

pub mod error;
pub mod listener_events;
pub mod protocol;
pub mod types;
