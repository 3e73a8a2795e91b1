//! Per-listener script sandbox.
//!
//! A [`ScriptSandbox`] is either empty or holds one compiled context plus
//! the exact source text it was built from. [`ScriptSandbox::invoke`]
//! rebuilds the context when the source text changes, and drops it when a
//! handler fails so the next call starts from a clean context.

use serde_json::Value;

use crate::engine::{HandlerSet, ScriptEngine};
use crate::error::{ErrorReport, SandboxError};

struct Compiled<H> {
    /// Exact source text the handlers were built from.
    source: String,
    handlers: H,
}

/// Compiles, caches and invokes one listener's script.
pub struct ScriptSandbox<E: ScriptEngine> {
    engine: E,
    /// Chunk name used for compilation and for attributing stack frames.
    chunk_name: String,
    state: Option<Compiled<E::Handlers>>,
    compilations: u64,
}

impl<E: ScriptEngine> ScriptSandbox<E> {
    pub fn new(engine: E, chunk_name: impl Into<String>) -> Self {
        Self {
            engine,
            chunk_name: chunk_name.into(),
            state: None,
            compilations: 0,
        }
    }

    /// Whether a compiled context is cached.
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Number of context builds attempted so far.
    pub fn compilations(&self) -> u64 {
        self.compilations
    }

    /// Drop the cached context.
    pub fn invalidate(&mut self) {
        self.state = None;
    }

    /// Run handler `event` of `source` with `args`.
    ///
    /// Returns `Ok(None)` when the script does not define `event`.
    pub async fn invoke(
        &mut self,
        source: &str,
        event: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, SandboxError> {
        let handlers = match &self.state {
            Some(compiled) if compiled.source == source => &compiled.handlers,
            _ => self.rebuild(source).await?,
        };

        if !handlers.has(event) {
            tracing::trace!(chunk = %self.chunk_name, event, "Script has no handler");
            return Ok(None);
        }

        let outcome = handlers.invoke(event, args).await;
        match outcome {
            Ok(result) => Ok(Some(result)),
            Err(failure) => {
                self.invalidate();
                let report = ErrorReport::from_failure(&failure, &self.chunk_name);
                tracing::debug!(
                    chunk = %self.chunk_name,
                    event,
                    error = %report.message,
                    "Handler failed, sandbox invalidated",
                );
                Err(SandboxError::Runtime(report))
            }
        }
    }

    async fn rebuild(&mut self, source: &str) -> Result<&E::Handlers, SandboxError> {
        self.state = None;
        self.compilations += 1;
        tracing::debug!(
            chunk = %self.chunk_name,
            compilations = self.compilations,
            "Compiling script",
        );

        let handlers = self
            .engine
            .compile(source, &self.chunk_name)
            .await
            .map_err(|failure| {
                SandboxError::Compile(ErrorReport::from_failure(&failure, &self.chunk_name))
            })?;
        let compiled = self.state.insert(Compiled {
            source: source.to_string(),
            handlers,
        });
        Ok(&compiled.handlers)
    }
}
