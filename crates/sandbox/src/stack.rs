//! Error text parsing for script failures.
//!
//! Lua reports failures as
//!
//! ```text
//! [string "listener/a"]:3: boom
//! stack traceback:
//!         [C]: in function 'error'
//!         [string "listener/a"]:3: in function 'onStart'
//!         [C]: in ?
//! ```
//!
//! [`parse_stack`] splits that into a message and [`StackFrame`]s;
//! [`filter_frames`] keeps only the frames that point into the listener's
//! own script.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

const TRACEBACK_MARKER: &str = "stack traceback:";

/// `<source>:<line>[:<column>]: in <what>` or `<source>: in <what>`.
static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<source>.+?):(?:(?P<line>\d+):)?(?:(?P<column>\d+):)? in (?P<what>.+)$")
        .expect("frame regex is valid")
});

/// `<source>:<line>: <message>` at the start of an error message.
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<source>[^\n]+?):(?P<line>\d+): (?P<message>.*)$")
        .expect("location regex is valid")
});

static QUOTED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?P<name>[^']+)'").expect("name regex is valid"));

/// One call-stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    /// Function name, when the engine knows it.
    pub function: Option<String>,
    /// Chunk or file the frame executes in (`[C]` for host functions).
    pub filename: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl StackFrame {
    /// `filename:line[:column] (function)`.
    pub fn display(&self) -> String {
        let mut out = self.filename.clone();
        if let Some(line) = self.line {
            out.push_str(&format!(":{line}"));
        }
        if let Some(column) = self.column {
            out.push_str(&format!(":{column}"));
        }
        if let Some(function) = &self.function {
            out.push_str(&format!(" ({function})"));
        }
        out
    }
}

/// A failure split into its message and frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedStack {
    pub message: String,
    pub frames: Vec<StackFrame>,
}

/// Split raw failure text into message and frames.
///
/// Text without a traceback yields the whole text as message and no
/// frames. Lines of the traceback that do not look like frames are
/// skipped.
pub fn parse_stack(text: &str) -> ParsedStack {
    let (message, traceback) = match text.find(TRACEBACK_MARKER) {
        Some(index) => (&text[..index], &text[index + TRACEBACK_MARKER.len()..]),
        None => (text, ""),
    };

    let frames = traceback
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_frame)
        .collect();

    ParsedStack {
        message: message.trim_end().to_string(),
        frames,
    }
}

/// Keep the frames that run inside the listener's own chunks.
///
/// Host frames on top of the stack (the builtin that raised, such as
/// `error`) are skipped; the result then stops at the first frame that is
/// not in one of `own_chunks`, which cuts off the engine and host frames
/// below the script.
pub fn filter_frames(frames: &[StackFrame], own_chunks: &[&str]) -> Vec<StackFrame> {
    frames
        .iter()
        .skip_while(|frame| !is_own(&frame.filename, own_chunks))
        .take_while(|frame| is_own(&frame.filename, own_chunks))
        .cloned()
        .collect()
}

/// Remove the `chunk:line: ` prefix the engine puts on a message raised in
/// one of `own_chunks`.
pub fn strip_location(message: &str, own_chunks: &[&str]) -> String {
    if let Some(caps) = LOCATION_RE.captures(message) {
        if is_own(&caps["source"], own_chunks) {
            return caps["message"].to_string();
        }
    }
    message.to_string()
}

/// Chunk name as it appears in messages and tracebacks, reduced to the
/// name it was loaded under.
///
/// Lua renders string chunks as `[string "name"]` and prefixes literal
/// names with `=` or `@`.
pub fn normalize_chunk_name(source: &str) -> &str {
    let source = source.trim();
    let source = source
        .strip_prefix("[string \"")
        .and_then(|rest| rest.strip_suffix("\"]"))
        .unwrap_or(source);
    source.trim_start_matches(['=', '@'])
}

fn is_own(source: &str, own_chunks: &[&str]) -> bool {
    let normalized = normalize_chunk_name(source);
    own_chunks
        .iter()
        .any(|chunk| normalize_chunk_name(chunk) == normalized)
}

fn parse_frame(line: &str) -> Option<StackFrame> {
    if line.starts_with("(...") {
        // "(...tail calls...)"
        return None;
    }
    let caps = FRAME_RE.captures(line)?;
    let what = &caps["what"];
    let function = match what {
        "main chunk" | "?" => None,
        _ if what.starts_with("function <") => None,
        _ => QUOTED_NAME_RE
            .captures(what)
            .map(|c| c["name"].to_string()),
    };

    Some(StackFrame {
        function,
        filename: caps["source"].to_string(),
        line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
        column: caps.name("column").and_then(|m| m.as_str().parse().ok()),
    })
}
