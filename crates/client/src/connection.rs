//! The store protocol over one shared connection.
//!
//! [`Connection`] owns the request correlator and the diff route table.
//! It knows nothing about sockets: outbound frames go to an
//! `mpsc::UnboundedSender<String>` and inbound text is handed to
//! [`Connection::dispatch_text`]. [`crate::client`] wires both ends to a
//! WebSocket.
//!
//! Every operation writes its request immediately and returns a future that
//! only awaits the reply.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use objwatch_core::types::{snapshot_from, Snapshot};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::messages::{
    parse_message, GetResult, QueryDiff, QueryId, QueryResult, RemoveResult, Request,
    ServerMessage,
};
use crate::query::{LiveQuery, QueryView};
use crate::rpc::RpcClient;

type Routes = HashMap<QueryId, mpsc::UnboundedSender<QueryDiff>>;

/// Shared handle to the store. Wrap in `Arc` and clone freely.
pub struct Connection {
    rpc: RpcClient,
    routes: Arc<Mutex<Routes>>,
    /// Cancelled once the transport is gone.
    closed: CancellationToken,
}

impl Connection {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            rpc: RpcClient::new(outbound),
            routes: Arc::new(Mutex::new(HashMap::new())),
            closed: CancellationToken::new(),
        }
    }

    /// Token cancelled when the connection is lost.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of calls waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.rpc.pending_count()
    }

    /// Number of live subscriptions with a diff route.
    pub fn subscription_count(&self) -> usize {
        lock(&self.routes).len()
    }

    // ---- inbound ----

    /// Parse one text frame and route it.
    pub fn dispatch_text(&self, text: &str) {
        match parse_message(text) {
            Ok(msg) => self.dispatch(msg),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_message = %text,
                    "Failed to parse store message",
                );
            }
        }
    }

    /// Route a parsed frame: responses to the correlator, diffs to the
    /// subscription they name.
    pub fn dispatch(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Response(response) => {
                self.rpc.on_response(response);
            }
            ServerMessage::Diff(diff) => self.route_diff(diff),
        }
    }

    /// Mark the connection as lost: fail pending calls, end every live
    /// query, and cancel the closed token.
    pub fn shutdown(&self, reason: &str) {
        if self.closed.is_cancelled() {
            return;
        }
        tracing::error!(reason, "Store connection lost");
        self.rpc.abandon_all();
        lock(&self.routes).clear();
        self.closed.cancel();
    }

    // ---- store operations ----

    /// All objects matching `pattern`, keyed by name.
    pub fn get(
        &self,
        pattern: &str,
    ) -> impl Future<Output = Result<Snapshot, ClientError>> + Send + 'static {
        let call = self.rpc.request(Request::Get {
            pattern: pattern.to_string(),
        });
        async move {
            let result: GetResult = decode(call.await?)?;
            Ok(snapshot_from(result.objects))
        }
    }

    pub fn set(
        &self,
        name: &str,
        value: Value,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        self.rpc.request(Request::Set {
            name: name.to_string(),
            value,
        })
    }

    pub fn patch(
        &self,
        name: &str,
        value: Value,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        self.rpc.request(Request::Patch {
            name: name.to_string(),
            value,
        })
    }

    /// Delete an object. Resolves to whether it existed.
    pub fn remove(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<bool, ClientError>> + Send + 'static {
        let call = self.rpc.request(Request::Remove {
            name: name.to_string(),
        });
        async move {
            let result: RemoveResult = decode(call.await?)?;
            Ok(result.existed)
        }
    }

    pub fn emit(
        &self,
        object: &str,
        event: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        self.rpc.request(Request::Emit {
            object: object.to_string(),
            event: event.to_string(),
            data,
        })
    }

    /// Subscribe to `pattern`.
    ///
    /// The diff route is installed while the reply is being dispatched, so
    /// a diff that follows the reply on the wire is never lost.
    pub fn query(
        &self,
        pattern: &str,
    ) -> impl Future<Output = Result<LiveQuery, ClientError>> + Send + 'static {
        let (diff_tx, diff_rx) = mpsc::unbounded_channel();
        let routes = Arc::clone(&self.routes);

        let call = self.rpc.request_with_hook(
            Request::Query {
                pattern: pattern.to_string(),
            },
            move |settled| {
                let query_id = settled
                    .as_ref()
                    .ok()
                    .and_then(|result| result.get("queryId"))
                    .and_then(|id| serde_json::from_value::<QueryId>(id.clone()).ok());
                if let Some(query_id) = query_id {
                    lock(&routes).insert(query_id, diff_tx);
                }
            },
        );

        let pattern = pattern.to_string();
        async move {
            let result: QueryResult = decode(call.await?)?;
            tracing::debug!(
                pattern = %pattern,
                query_id = %result.query_id,
                objects = result.objects.len(),
                "Query subscribed",
            );
            Ok(LiveQuery::new(
                QueryView::new(result.query_id, result.objects),
                diff_rx,
            ))
        }
    }

    /// Release a subscription. The route is dropped before the request is
    /// sent, so no diff reaches the view afterwards.
    pub fn stop_query(
        &self,
        query_id: &QueryId,
    ) -> impl Future<Output = Result<(), ClientError>> + Send + 'static {
        lock(&self.routes).remove(query_id);
        let call = self.rpc.request(Request::Unsubscribe {
            query_id: query_id.clone(),
        });
        async move {
            call.await?;
            Ok(())
        }
    }

    // ---- private helpers ----

    fn route_diff(&self, diff: QueryDiff) {
        let route = lock(&self.routes).get(diff.query_id()).cloned();
        match route {
            Some(tx) => {
                if tx.send(diff).is_err() {
                    tracing::debug!("Diff for a query whose view is gone");
                }
            }
            None => {
                tracing::debug!(query_id = %diff.query_id(), "Diff for unknown query");
            }
        }
    }
}

fn lock(routes: &Mutex<Routes>) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Protocol(e.to_string()))
}
