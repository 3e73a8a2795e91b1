//! Script engine seam and host capability interface.
//!
//! Defines [`ScriptEngine`] (build a fresh context from source),
//! [`HandlerSet`] (look up and call named handlers in a built context) and
//! [`HostApi`] (what a script may do to the outside world), along with
//! [`ScriptFailure`] and [`HostError`].

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// A failure reported by the engine, as raw text (message plus whatever
/// traceback the engine attaches).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub raw: String,
}

impl ScriptFailure {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::error::Error for ScriptFailure {}

/// The named entry points exposed by a compiled script.
pub trait HandlerSet {
    /// Whether the script defines `name`.
    fn has(&self, name: &str) -> bool;

    /// Call `name` with `args`, awaiting it if it suspends.
    fn invoke(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, ScriptFailure>>;
}

/// Builds isolated script contexts.
pub trait ScriptEngine {
    type Handlers: HandlerSet;

    /// Create a fresh context with host capabilities installed, compile
    /// `source` as chunk `chunk_name`, and run its top level once.
    fn compile(
        &self,
        source: &str,
        chunk_name: &str,
    ) -> impl Future<Output = Result<Self::Handlers, ScriptFailure>>;
}

/// Error returned by a host capability; raised inside the script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

/// Capabilities exposed to a listener script.
///
/// Each store operation maps 1:1 onto a store request. `log` records
/// console output and failures against the listener.
#[async_trait(?Send)]
pub trait HostApi {
    /// Record a log entry of `kind` (`console.log`, `console.error`,
    /// `error`) for this listener.
    fn log(&self, kind: &str, data: Value);

    /// Objects matching `pattern`, as `{name: {name, value}}`.
    async fn get(&self, pattern: &str) -> Result<Value, HostError>;

    async fn set(&self, name: &str, value: Value) -> Result<Value, HostError>;

    async fn patch(&self, name: &str, value: Value) -> Result<Value, HostError>;

    /// Whether the object existed.
    async fn remove(&self, name: &str) -> Result<bool, HostError>;

    async fn emit(&self, object: &str, event: &str, data: Value) -> Result<Value, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_displays_raw_text() {
        let failure = ScriptFailure::new("x:1: boom\nstack traceback:");
        assert_eq!(failure.to_string(), "x:1: boom\nstack traceback:");
    }

    #[test]
    fn host_error_displays_message() {
        assert_eq!(HostError("offline".into()).to_string(), "offline");
    }
}
