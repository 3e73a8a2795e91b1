use serde_json::Value;

/// Errors surfaced by the store client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection is gone; the call will never be answered.
    #[error("Connection closed")]
    Disconnected,

    /// The store answered the call with an error payload.
    #[error("Request rejected: {}", rejection_message(.0))]
    Rejected(Value),

    /// The store answered with a payload of the wrong shape.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Human-readable text for a rejection payload. String payloads are used
/// as-is, anything else is rendered as JSON.
pub fn rejection_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
