//! Entity, snapshot and listener-definition types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// A named object in the store. `name` is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl Entity {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// JSON form handed to scripts (`{"name": .., "value": ..}`).
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("Entity is always serialisable")
    }
}

/// Current contents of a query, keyed by entity name.
pub type Snapshot = BTreeMap<String, Entity>;

/// Build a snapshot from a list of entities. Later duplicates win.
pub fn snapshot_from(entities: impl IntoIterator<Item = Entity>) -> Snapshot {
    entities
        .into_iter()
        .map(|entity| (entity.name.clone(), entity))
        .collect()
}

/// JSON object `{name: entity, ...}` for a snapshot.
pub fn snapshot_to_json(snapshot: &Snapshot) -> Value {
    Value::Object(
        snapshot
            .iter()
            .map(|(name, entity)| (name.clone(), entity.to_json()))
            .collect(),
    )
}

/// The `value` of a listener entity: which objects to watch and the
/// script that handles their notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub pattern: String,
    pub code: String,
}

impl ListenerSpec {
    /// Extract the listener definition from an entity value.
    pub fn from_entity(entity: &Entity) -> Result<Self, CoreError> {
        serde_json::from_value(entity.value.clone()).map_err(|e| CoreError::InvalidListener {
            name: entity.name.clone(),
            reason: e.to_string(),
        })
    }
}
