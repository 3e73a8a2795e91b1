//! Lua implementation of the script engine.
//!
//! Every [`LuaEngine::compile`] creates a new Lua state with a restricted
//! standard library (no `io`, `os`, `package` or `debug`), installs the
//! host capabilities as globals, and runs the chunk. Handlers are the
//! global functions the chunk defines (`function onStart(objects) ... end`).
//!
//! Capabilities available to scripts:
//!
//! | Global                       | Host call                  |
//! |------------------------------|----------------------------|
//! | `console.log(...)`           | `log("console.log", ..)`   |
//! | `console.error(...)`         | `log("console.error", ..)` |
//! | `get(pattern)`               | `get`                      |
//! | `set(name, value)`           | `set`                      |
//! | `patch(name, value)`         | `patch`                    |
//! | `remove(name)`               | `remove`                   |
//! | `emit(object, event, data)`  | `emit`                     |
//!
//! Store calls suspend the calling handler until the store replies.

use std::rc::Rc;

use mlua::{Function, Lua, LuaOptions, LuaSerdeExt, MultiValue, StdLib, Variadic};
use objwatch_core::protocol::{LOG_CONSOLE_ERROR, LOG_CONSOLE_LOG};
use serde_json::{json, Value};

use crate::engine::{HandlerSet, HostApi, HostError, ScriptEngine, ScriptFailure};

/// Base-library globals removed from every context.
const REMOVED_GLOBALS: [&str; 3] = ["dofile", "loadfile", "collectgarbage"];

/// Builds one Lua state per compilation, wired to `host`.
pub struct LuaEngine {
    host: Rc<dyn HostApi>,
}

impl LuaEngine {
    pub fn new(host: Rc<dyn HostApi>) -> Self {
        Self { host }
    }

    fn new_state(&self) -> mlua::Result<Lua> {
        let lua = Lua::new_with(
            StdLib::COROUTINE | StdLib::TABLE | StdLib::STRING | StdLib::UTF8 | StdLib::MATH,
            LuaOptions::new(),
        )?;
        let globals = lua.globals();
        for name in REMOVED_GLOBALS {
            globals.set(name, mlua::Value::Nil)?;
        }
        install_console(&lua, &self.host)?;
        install_store(&lua, &self.host)?;
        Ok(lua)
    }
}

impl ScriptEngine for LuaEngine {
    type Handlers = LuaHandlers;

    async fn compile(&self, source: &str, chunk_name: &str) -> Result<LuaHandlers, ScriptFailure> {
        let lua = self.new_state().map_err(failure)?;
        lua.load(source)
            .set_name(format!("={chunk_name}"))
            .exec_async()
            .await
            .map_err(failure)?;
        Ok(LuaHandlers { lua })
    }
}

/// A compiled Lua context; handlers are its global functions.
pub struct LuaHandlers {
    lua: Lua,
}

impl HandlerSet for LuaHandlers {
    fn has(&self, name: &str) -> bool {
        !matches!(
            self.lua.globals().get::<mlua::Value>(name),
            Ok(mlua::Value::Nil) | Err(_)
        )
    }

    async fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, ScriptFailure> {
        let handler: mlua::Value = self.lua.globals().get(name).map_err(failure)?;
        let handler: Function = match handler {
            mlua::Value::Function(f) => f,
            other => {
                return Err(ScriptFailure::new(format!(
                    "attempt to call a {} value (global '{name}')",
                    other.type_name()
                )))
            }
        };

        let args = args
            .iter()
            .map(|arg| self.lua.to_value(arg))
            .collect::<mlua::Result<MultiValue>>()
            .map_err(failure)?;

        let ret: mlua::Value = handler.call_async(args).await.map_err(failure)?;

        match self.lua.from_value::<Value>(ret) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::debug!(
                    handler = name,
                    error = %e,
                    "Handler result is not JSON-representable"
                );
                Ok(Value::Null)
            }
        }
    }
}

// ---- capability installation ----

fn install_console(lua: &Lua, host: &Rc<dyn HostApi>) -> mlua::Result<()> {
    let console = lua.create_table()?;
    for (field, kind) in [("log", LOG_CONSOLE_LOG), ("error", LOG_CONSOLE_ERROR)] {
        let host = Rc::clone(host);
        let func = lua.create_function(move |lua, values: Variadic<mlua::Value>| {
            let message: Vec<Value> = values.iter().map(|v| lua_to_json(lua, v)).collect();
            host.log(kind, json!({ "message": message }));
            Ok(())
        })?;
        console.set(field, func)?;
    }
    lua.globals().set("console", console)
}

fn install_store(lua: &Lua, host: &Rc<dyn HostApi>) -> mlua::Result<()> {
    let globals = lua.globals();

    let h = Rc::clone(host);
    globals.set(
        "get",
        lua.create_async_function(move |lua, pattern: String| {
            let host = Rc::clone(&h);
            async move {
                let objects = host.get(&pattern).await.map_err(host_error)?;
                lua.to_value(&objects)
            }
        })?,
    )?;

    let h = Rc::clone(host);
    globals.set(
        "set",
        lua.create_async_function(move |lua, (name, value): (String, mlua::Value)| {
            let host = Rc::clone(&h);
            let value = lua.from_value::<Value>(value);
            async move {
                let ack = host.set(&name, value?).await.map_err(host_error)?;
                lua.to_value(&ack)
            }
        })?,
    )?;

    let h = Rc::clone(host);
    globals.set(
        "patch",
        lua.create_async_function(move |lua, (name, value): (String, mlua::Value)| {
            let host = Rc::clone(&h);
            let value = lua.from_value::<Value>(value);
            async move {
                let ack = host.patch(&name, value?).await.map_err(host_error)?;
                lua.to_value(&ack)
            }
        })?,
    )?;

    let h = Rc::clone(host);
    globals.set(
        "remove",
        lua.create_async_function(move |_lua, name: String| {
            let host = Rc::clone(&h);
            async move { host.remove(&name).await.map_err(host_error) }
        })?,
    )?;

    let h = Rc::clone(host);
    globals.set(
        "emit",
        lua.create_async_function(
            move |lua, (object, event, data): (String, String, mlua::Value)| {
                let host = Rc::clone(&h);
                let data = lua.from_value::<Value>(data);
                async move {
                    let ack = host.emit(&object, &event, data?).await.map_err(host_error)?;
                    lua.to_value(&ack)
                }
            },
        )?,
    )?;

    Ok(())
}

fn lua_to_json(lua: &Lua, value: &mlua::Value) -> Value {
    lua.from_value::<Value>(value.clone())
        .unwrap_or_else(|_| Value::String(format!("<{}>", value.type_name())))
}

fn host_error(e: HostError) -> mlua::Error {
    mlua::Error::RuntimeError(e.0)
}

/// Flatten an mlua error into the raw text the stack parser expects.
fn failure(e: mlua::Error) -> ScriptFailure {
    let raw = match e {
        mlua::Error::RuntimeError(text) => text,
        mlua::Error::SyntaxError { message, .. } => message,
        mlua::Error::CallbackError { traceback, cause } => {
            format!("{}\n{traceback}", root_message(&cause))
        }
        other => other.to_string(),
    };
    ScriptFailure::new(raw)
}

/// The message at the bottom of a callback error chain, without the
/// `runtime error: ` prefix `Display` would add.
fn root_message(e: &mlua::Error) -> String {
    match e {
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            root_message(cause)
        }
        mlua::Error::RuntimeError(text) => text.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
