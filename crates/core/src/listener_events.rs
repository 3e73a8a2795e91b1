//! The fixed set of notifications a listener script can handle.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A listener notification, named after the script function it invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerEvent {
    /// Session started; args: `(snapshot)`.
    Start,
    /// Snapshot changed in any way; args: `(snapshot)`.
    Update,
    /// An object started matching; args: `(entity, snapshot)`.
    Add,
    /// A matching object changed; args: `(entity, snapshot)`.
    Change,
    /// An object stopped matching; args: `(entity, snapshot)`.
    Remove,
    /// An event was emitted on a matching object;
    /// args: `(entity, event, data, snapshot)`.
    Event,
}

impl ListenerEvent {
    pub const ALL: [ListenerEvent; 6] = [
        Self::Start,
        Self::Update,
        Self::Add,
        Self::Change,
        Self::Remove,
        Self::Event,
    ];

    /// Name of the script function handling this event.
    pub fn handler_name(self) -> &'static str {
        match self {
            Self::Start => "onStart",
            Self::Update => "onUpdate",
            Self::Add => "onAdd",
            Self::Change => "onChange",
            Self::Remove => "onRemove",
            Self::Event => "onEvent",
        }
    }
}

impl fmt::Display for ListenerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.handler_name())
    }
}

impl FromStr for ListenerEvent {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.handler_name() == s)
            .ok_or_else(|| CoreError::UnknownEvent(s.to_string()))
    }
}
