//! Script sandbox for listener handlers.
//!
//! - [`ScriptSandbox`]: per-listener compile/cache/invalidate state machine.
//! - [`ScriptEngine`] / [`HandlerSet`]: the engine seam, implemented by
//!   [`LuaEngine`].
//! - [`HostApi`]: capabilities a script can call.
//! - [`stack`]: failure text parsing and frame filtering.

pub mod engine;
pub mod error;
pub mod lua;
pub mod sandbox;
pub mod stack;

pub use engine::{HandlerSet, HostApi, HostError, ScriptEngine, ScriptFailure};
pub use error::{ErrorReport, SandboxError};
pub use lua::LuaEngine;
pub use sandbox::ScriptSandbox;
