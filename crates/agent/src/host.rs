//! Store capabilities exposed to one listener's script.

use std::sync::Arc;

use async_trait::async_trait;
use objwatch_client::error::rejection_message;
use objwatch_client::{ClientError, Connection};
use objwatch_core::protocol::{LOG_CONSOLE_ERROR, LOG_ERROR};
use objwatch_core::types::snapshot_to_json;
use objwatch_sandbox::{HostApi, HostError};
use serde_json::Value;

/// [`HostApi`] bound to a listener name and the shared connection.
///
/// Store calls are forwarded unchanged. Log entries go to tracing and are
/// emitted on the listener object itself, so store clients can watch a
/// listener's output by subscribing to it.
pub struct ListenerHost {
    listener: String,
    conn: Arc<Connection>,
}

impl ListenerHost {
    pub fn new(listener: impl Into<String>, conn: Arc<Connection>) -> Self {
        Self {
            listener: listener.into(),
            conn,
        }
    }
}

#[async_trait(?Send)]
impl HostApi for ListenerHost {
    fn log(&self, kind: &str, data: Value) {
        match kind {
            LOG_ERROR | LOG_CONSOLE_ERROR => {
                tracing::warn!(listener = %self.listener, kind, data = %data, "Listener log");
            }
            _ => {
                tracing::info!(listener = %self.listener, kind, data = %data, "Listener log");
            }
        }

        let ack = self.conn.emit(&self.listener, kind, data);
        let listener = self.listener.clone();
        tokio::spawn(async move {
            if let Err(e) = ack.await {
                tracing::debug!(listener = %listener, error = %e, "Listener log emit failed");
            }
        });
    }

    async fn get(&self, pattern: &str) -> Result<Value, HostError> {
        let objects = self.conn.get(pattern).await.map_err(host_error)?;
        Ok(snapshot_to_json(&objects))
    }

    async fn set(&self, name: &str, value: Value) -> Result<Value, HostError> {
        self.conn.set(name, value).await.map_err(host_error)
    }

    async fn patch(&self, name: &str, value: Value) -> Result<Value, HostError> {
        self.conn.patch(name, value).await.map_err(host_error)
    }

    async fn remove(&self, name: &str) -> Result<bool, HostError> {
        self.conn.remove(name).await.map_err(host_error)
    }

    async fn emit(&self, object: &str, event: &str, data: Value) -> Result<Value, HostError> {
        self.conn.emit(object, event, data).await.map_err(host_error)
    }
}

/// Rejections surface to the script as the store's own message.
fn host_error(e: ClientError) -> HostError {
    match e {
        ClientError::Rejected(payload) => HostError(rejection_message(&payload)),
        other => HostError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn host() -> (ListenerHost, Arc<Connection>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(tx));
        (ListenerHost::new("listener/a", Arc::clone(&conn)), conn, rx)
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn log_emits_on_the_listener_object() {
        let (host, _conn, mut rx) = host();

        host.log("console.log", json!({"message": ["hi"]}));

        let frame = sent(&mut rx);
        assert_eq!(frame["type"], "emit");
        assert_eq!(frame["object"], "listener/a");
        assert_eq!(frame["event"], "console.log");
        assert_eq!(frame["data"], json!({"message": ["hi"]}));
    }

    #[tokio::test]
    async fn get_returns_objects_keyed_by_name() {
        let (host, conn, mut rx) = host();

        let call = host.get("sensors/*");
        let responder = async {
            tokio::task::yield_now().await;
            let frame = sent(&mut rx);
            assert_eq!(frame["pattern"], "sensors/*");
            conn.dispatch_text(
                &json!({
                    "requestId": frame["id"],
                    "result": {"objects": [{"name": "sensors/1", "value": 1}]},
                })
                .to_string(),
            );
        };
        let (result, ()) = tokio::join!(call, responder);

        assert_eq!(
            result.unwrap(),
            json!({"sensors/1": {"name": "sensors/1", "value": 1}})
        );
    }

    #[tokio::test]
    async fn rejection_becomes_host_error_with_store_message() {
        let (host, conn, mut rx) = host();

        let call = host.remove("sensors/1");
        let responder = async {
            tokio::task::yield_now().await;
            let frame = sent(&mut rx);
            conn.dispatch_text(
                &json!({"requestId": frame["id"], "error": "not allowed"}).to_string(),
            );
        };
        let (result, ()) = tokio::join!(call, responder);

        assert_eq!(result.unwrap_err(), HostError("not allowed".into()));
    }
}
