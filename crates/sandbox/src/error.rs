use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::ScriptFailure;
use crate::stack::{filter_frames, parse_stack, strip_location, StackFrame};

/// A script failure attributed to the listener's own code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Error message without the engine's location prefix.
    pub message: String,
    /// Frames inside the listener's script, innermost first.
    pub frames: Vec<StackFrame>,
    /// Unfiltered engine text.
    pub raw: String,
}

impl ErrorReport {
    /// Parse `failure` and keep only what points into `chunk_name`.
    pub fn from_failure(failure: &ScriptFailure, chunk_name: &str) -> Self {
        let parsed = parse_stack(&failure.raw);
        let own = [chunk_name];
        Self {
            message: strip_location(&parsed.message, &own),
            frames: filter_frames(&parsed.frames, &own),
            raw: failure.raw.clone(),
        }
    }

    /// Message followed by one `    at <frame>` line per frame.
    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        for frame in &self.frames {
            out.push_str("\n    at ");
            out.push_str(&frame.display());
        }
        out
    }

    /// Payload emitted on the listener's `error` log channel.
    pub fn to_log_data(&self) -> Value {
        json!({
            "error": self.render(),
            "message": self.message,
            "stack": self.frames,
        })
    }
}

/// Why a sandbox invocation failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    /// Building the context (compile or top-level run) failed.
    #[error("Script compile error: {}", .0.message)]
    Compile(ErrorReport),

    /// The handler raised an error.
    #[error("Script runtime error: {}", .0.message)]
    Runtime(ErrorReport),
}

impl SandboxError {
    pub fn report(&self) -> &ErrorReport {
        match self {
            Self::Compile(report) | Self::Runtime(report) => report,
        }
    }
}
