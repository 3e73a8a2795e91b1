//! Request/response correlation over a single outbound channel.
//!
//! Every call gets the next positive id and a pending entry; the reply
//! carrying that id settles it. Frames are written when the call is made,
//! not when the returned future is first polled, so wire order always
//! matches call order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::ClientError;
use crate::messages::{encode_request, Request, Response};

/// How a call ended: `Ok(result)` or `Err(error payload)`.
pub type Settlement = Result<Value, Value>;

/// Runs inside [`RpcClient::on_response`] before the caller is woken.
pub type SettleHook = Box<dyn FnOnce(&Settlement) + Send>;

struct PendingCall {
    tx: oneshot::Sender<Settlement>,
    hook: Option<SettleHook>,
}

/// Multiplexes calls over one outbound frame channel.
pub struct RpcClient {
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCall>>,
    outbound: mpsc::UnboundedSender<String>,
}

impl RpcClient {
    /// `outbound` receives one serialised JSON frame per call.
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_request_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    /// Send `request` and wait for its reply.
    pub fn request(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        self.call(request, None)
    }

    /// Like [`request`](Self::request), but `hook` sees the settlement
    /// synchronously, before any later inbound frame is processed.
    pub fn request_with_hook(
        &self,
        request: Request,
        hook: impl FnOnce(&Settlement) + Send + 'static,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        self.call(request, Some(Box::new(hook)))
    }

    /// Settle the pending call matching `response.request_id`.
    ///
    /// Returns `false` when no call is waiting for that id.
    pub fn on_response(&self, response: Response) -> bool {
        let Some(call) = self.lock_pending().remove(&response.request_id) else {
            tracing::debug!(
                request_id = response.request_id,
                "Response for unknown request id"
            );
            return false;
        };

        let settlement = match response.error {
            Some(error) => Err(error),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };

        if let Some(hook) = call.hook {
            hook(&settlement);
        }
        // The caller may have stopped waiting.
        let _ = call.tx.send(settlement);
        true
    }

    /// Drop every pending call; their futures fail with
    /// [`ClientError::Disconnected`].
    pub fn abandon_all(&self) {
        let abandoned: Vec<_> = self.lock_pending().drain().collect();
        if !abandoned.is_empty() {
            tracing::warn!(count = abandoned.len(), "Abandoning pending requests");
        }
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    // ---- private helpers ----

    fn call(
        &self,
        request: Request,
        hook: Option<SettleHook>,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        let started = self.start(&request, hook);

        async move {
            match started?.await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(error)) => Err(ClientError::Rejected(error)),
                Err(_) => Err(ClientError::Disconnected),
            }
        }
    }

    fn start(
        &self,
        request: &Request,
        hook: Option<SettleHook>,
    ) -> Result<oneshot::Receiver<Settlement>, ClientError> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, PendingCall { tx, hook });

        if self.outbound.send(encode_request(id, request)).is_err() {
            self.lock_pending().remove(&id);
            return Err(ClientError::Disconnected);
        }
        Ok(rx)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
