//! objtalk wire message types and parser.
//!
//! Outbound requests are JSON objects `{"id": n, "type": "<kind>", ...}`.
//! Inbound frames are either call responses (`{"requestId": n, "result": ..}`
//! or `{"requestId": n, "error": ..}`) or unsolicited query diffs tagged by
//! `"type"` and carrying the `"queryId"` of the subscription they belong to.

use std::fmt;

use objwatch_core::types::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque subscription handle assigned by the store.
///
/// objtalk servers hand out numeric ids, but nothing here depends on that,
/// so string ids are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryId {
    Number(u64),
    Text(String),
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// All store operations the runner issues.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "get")]
    Get { pattern: String },

    #[serde(rename = "set")]
    Set { name: String, value: Value },

    #[serde(rename = "patch")]
    Patch { name: String, value: Value },

    #[serde(rename = "remove")]
    Remove { name: String },

    #[serde(rename = "emit")]
    Emit {
        object: String,
        event: String,
        data: Value,
    },

    #[serde(rename = "query")]
    Query { pattern: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        #[serde(rename = "queryId")]
        query_id: QueryId,
    },
}

/// A request as written to the socket: the correlation id plus the
/// flattened request fields.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub request: &'a Request,
}

/// Reply to a single request.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Unsolicited change notification for one subscription.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum QueryDiff {
    #[serde(rename = "queryAdd")]
    Add {
        #[serde(rename = "queryId")]
        query_id: QueryId,
        object: Entity,
    },

    #[serde(rename = "queryChange")]
    Change {
        #[serde(rename = "queryId")]
        query_id: QueryId,
        object: Entity,
    },

    #[serde(rename = "queryRemove")]
    Remove {
        #[serde(rename = "queryId")]
        query_id: QueryId,
        object: Entity,
    },

    /// `object` is the *name* of the entity the event was emitted on.
    #[serde(rename = "queryEvent")]
    Event {
        #[serde(rename = "queryId")]
        query_id: QueryId,
        object: String,
        event: String,
        #[serde(default)]
        data: Value,
    },
}

impl QueryDiff {
    /// Subscription this diff is addressed to.
    pub fn query_id(&self) -> &QueryId {
        match self {
            Self::Add { query_id, .. }
            | Self::Change { query_id, .. }
            | Self::Remove { query_id, .. }
            | Self::Event { query_id, .. } => query_id,
        }
    }
}

/// Any frame the store sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Diff(QueryDiff),
    Response(Response),
}

/// Payload of a `get` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GetResult {
    #[serde(default)]
    pub objects: Vec<Entity>,
}

/// Payload of a `query` response.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "queryId")]
    pub query_id: QueryId,
    #[serde(default)]
    pub objects: Vec<Entity>,
}

/// Payload of a `remove` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveResult {
    #[serde(default)]
    pub existed: bool,
}

/// Parse a store text frame.
///
/// Returns `Err` for malformed JSON or frames that are neither a response
/// nor a known diff. Callers should log and continue.
pub fn parse_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialise a request with its correlation id.
pub fn encode_request(id: u64, request: &Request) -> String {
    serde_json::to_string(&Envelope { id, request }).expect("Envelope is always serialisable")
}
