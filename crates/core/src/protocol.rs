//! Well-known objtalk names.
//!
//! The listener namespace, the object the liveness ping reads, and the
//! kinds of log records a listener emits back to the store. Wire message
//! `type` tags live on the serde enums in `objwatch-client`.

/// Pattern selecting every listener definition in the store.
pub const LISTENER_PATTERN: &str = "listener/*";

/// Object name queried by the liveness ping.
pub const PING_PATTERN: &str = "ping";

/// Listener log kind for `console.log` output.
pub const LOG_CONSOLE_LOG: &str = "console.log";

/// Listener log kind for `console.error` output.
pub const LOG_CONSOLE_ERROR: &str = "console.error";

/// Listener log kind for compile and handler failures.
pub const LOG_ERROR: &str = "error";
