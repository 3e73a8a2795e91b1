//! In-memory objtalk store for agent integration tests.
//!
//! Owns the receiving end of a [`Connection`]'s outbound channel, answers
//! each request the way a store would, and pushes query diffs through
//! [`Connection::dispatch_text`]. No sockets involved.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

use objwatch_client::Connection;
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Yield rounds in [`FakeStore::settle`].
const SETTLE_ROUNDS: usize = 200;

pub struct FakeStore {
    pub conn: Arc<Connection>,
    outbound: RefCell<mpsc::UnboundedReceiver<String>>,
    objects: RefCell<BTreeMap<String, Value>>,
    subscriptions: RefCell<BTreeMap<u64, String>>,
    next_query_id: Cell<u64>,
    requests: RefCell<Vec<Value>>,
}

impl FakeStore {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            conn: Arc::new(Connection::new(tx)),
            outbound: RefCell::new(rx),
            objects: RefCell::new(BTreeMap::new()),
            subscriptions: RefCell::new(BTreeMap::new()),
            next_query_id: Cell::new(1),
            requests: RefCell::new(Vec::new()),
        }
    }

    // ---- store-side mutations ----

    /// Create or replace an object, notifying matching subscriptions.
    pub fn put(&self, name: &str, value: Value) {
        let existed = self
            .objects
            .borrow_mut()
            .insert(name.to_string(), value.clone())
            .is_some();
        let kind = if existed { "queryChange" } else { "queryAdd" };
        self.notify(name, |query_id| {
            json!({"type": kind, "queryId": query_id, "object": {"name": name, "value": value}})
        });
    }

    /// Delete an object, notifying matching subscriptions.
    pub fn delete(&self, name: &str) -> bool {
        let Some(value) = self.objects.borrow_mut().remove(name) else {
            return false;
        };
        self.notify(name, |query_id| {
            json!({
                "type": "queryRemove",
                "queryId": query_id,
                "object": {"name": name, "value": value},
            })
        });
        true
    }

    /// Emit an event on an object, notifying matching subscriptions.
    pub fn raise(&self, object: &str, event: &str, data: Value) {
        self.notify(object, |query_id| {
            json!({
                "type": "queryEvent",
                "queryId": query_id,
                "object": object,
                "event": event,
                "data": data,
            })
        });
    }

    // ---- driving ----

    /// Answer requests until the agent goes quiet.
    pub async fn settle(&self) {
        for _ in 0..SETTLE_ROUNDS {
            tokio::task::yield_now().await;
            self.serve_pending();
        }
    }

    /// Answer every request currently queued on the outbound channel.
    pub fn serve_pending(&self) {
        loop {
            let frame = self.outbound.borrow_mut().try_recv();
            let Ok(frame) = frame else { break };
            let request: Value = serde_json::from_str(&frame).expect("agent sends JSON");
            self.requests.borrow_mut().push(request.clone());
            self.answer(&request);
        }
    }

    // ---- inspection ----

    pub fn requests(&self) -> Vec<Value> {
        self.requests.borrow().clone()
    }

    pub fn requests_of(&self, kind: &str) -> Vec<Value> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r["type"] == kind)
            .cloned()
            .collect()
    }

    /// `(event, data)` of every emit the agent sent on `object`.
    pub fn emits_on(&self, object: &str) -> Vec<(String, Value)> {
        self.requests_of("emit")
            .into_iter()
            .filter(|r| r["object"] == object)
            .map(|r| (r["event"].as_str().unwrap_or_default().to_string(), r["data"].clone()))
            .collect()
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.objects.borrow().get(name).cloned()
    }

    pub fn subscription_patterns(&self) -> Vec<String> {
        self.subscriptions.borrow().values().cloned().collect()
    }

    // ---- private helpers ----

    fn answer(&self, request: &Value) {
        let id = request["id"].clone();
        let result = match request["type"].as_str().unwrap_or_default() {
            "get" => {
                let pattern = request["pattern"].as_str().unwrap_or_default();
                json!({"objects": self.matching(pattern)})
            }
            "query" => {
                let pattern = request["pattern"].as_str().unwrap_or_default().to_string();
                let query_id = self.next_query_id.get();
                self.next_query_id.set(query_id + 1);
                let objects = self.matching(&pattern);
                self.subscriptions.borrow_mut().insert(query_id, pattern);
                json!({"queryId": query_id, "objects": objects})
            }
            "unsubscribe" => {
                let query_id = request["queryId"].as_u64().unwrap_or_default();
                self.subscriptions.borrow_mut().remove(&query_id);
                Value::Null
            }
            "set" => {
                let name = request["name"].as_str().unwrap_or_default().to_string();
                self.respond(&id, Value::Null);
                self.put(&name, request["value"].clone());
                return;
            }
            "patch" => {
                let name = request["name"].as_str().unwrap_or_default().to_string();
                let mut value = self.value(&name).unwrap_or_else(|| json!({}));
                if let (Some(target), Some(patch)) =
                    (value.as_object_mut(), request["value"].as_object())
                {
                    for (k, v) in patch {
                        target.insert(k.clone(), v.clone());
                    }
                }
                self.respond(&id, Value::Null);
                self.put(&name, value);
                return;
            }
            "remove" => {
                let name = request["name"].as_str().unwrap_or_default().to_string();
                let existed = self.delete(&name);
                json!({"existed": existed})
            }
            "emit" => {
                self.respond(&id, Value::Null);
                let object = request["object"].as_str().unwrap_or_default().to_string();
                let event = request["event"].as_str().unwrap_or_default().to_string();
                self.raise(&object, &event, request["data"].clone());
                return;
            }
            other => {
                self.conn.dispatch_text(
                    &json!({"requestId": id, "error": format!("unknown request type {other}")})
                        .to_string(),
                );
                return;
            }
        };
        self.respond(&id, result);
    }

    fn respond(&self, id: &Value, result: Value) {
        self.conn
            .dispatch_text(&json!({"requestId": id, "result": result}).to_string());
    }

    fn matching(&self, pattern: &str) -> Vec<Value> {
        self.objects
            .borrow()
            .iter()
            .filter(|(name, _)| matches_pattern(pattern, name))
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect()
    }

    fn notify(&self, name: &str, diff: impl Fn(u64) -> Value) {
        let targets: Vec<u64> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|(_, pattern)| matches_pattern(pattern, name))
            .map(|(id, _)| *id)
            .collect();
        for query_id in targets {
            self.conn.dispatch_text(&diff(query_id).to_string());
        }
    }
}

/// `prefix*` matches by prefix; anything else matches exactly.
fn matches_pattern(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}
