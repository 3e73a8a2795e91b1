//! One running listener: subscription, ordering queue and script sandbox.
//!
//! [`ListenerSession::start`] subscribes to the listener's pattern, queues
//! `onStart` with the initial snapshot, and spawns a pump that turns every
//! view event into a queued handler invocation. Handler arguments are
//! copied when the invocation is queued, so a handler always sees the view
//! as it was when its diff arrived.

use std::rc::Rc;
use std::sync::Arc;

use objwatch_client::{Connection, LiveQuery, QueryId, ViewEvent};
use objwatch_core::listener_events::ListenerEvent;
use objwatch_core::protocol::LOG_ERROR;
use objwatch_core::types::{snapshot_to_json, Entity, ListenerSpec};
use objwatch_sandbox::{HostApi, LuaEngine, ScriptSandbox};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::host::ListenerHost;
use crate::ordering::OrderingQueue;

/// A started listener. Dropping it without [`ListenerSession::teardown`]
/// leaks the subscription until the connection ends.
pub struct ListenerSession {
    name: String,
    query_id: QueryId,
    conn: Arc<Connection>,
    queue: Rc<OrderingQueue>,
    dispatcher: Rc<Dispatcher>,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

impl ListenerSession {
    /// Subscribe to the listener's pattern and queue `onStart`.
    ///
    /// Must run inside a [`tokio::task::LocalSet`].
    pub async fn start(entity: &Entity, conn: Arc<Connection>) -> Result<Self, SessionError> {
        let spec = ListenerSpec::from_entity(entity)?;
        let name = entity.name.clone();

        let live = conn
            .query(&spec.pattern)
            .await
            .map_err(|source| SessionError::Subscribe {
                pattern: spec.pattern.clone(),
                source,
            })?;
        let query_id = live.id().clone();

        let host = Rc::new(ListenerHost::new(name.clone(), Arc::clone(&conn)));
        let engine = LuaEngine::new(Rc::clone(&host) as Rc<dyn HostApi>);
        let dispatcher = Rc::new(Dispatcher {
            listener: name.clone(),
            code: spec.code,
            host,
            sandbox: Mutex::new(ScriptSandbox::new(engine, name.clone())),
        });

        let queue = Rc::new(OrderingQueue::new(name.clone()));
        queue.enqueue(Rc::clone(&dispatcher).run(
            ListenerEvent::Start,
            vec![snapshot_to_json(live.objects())],
        ));

        let cancel = CancellationToken::new();
        let pump = tokio::task::spawn_local(pump_events(
            live,
            Rc::clone(&dispatcher),
            Rc::clone(&queue),
            cancel.clone(),
        ));

        tracing::info!(
            listener = %name,
            pattern = %spec.pattern,
            query_id = %query_id,
            "Listener started",
        );

        Ok(Self {
            name,
            query_id,
            conn,
            queue,
            dispatcher,
            cancel,
            pump,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    /// Number of script builds so far, or `None` while a handler is
    /// running.
    pub fn compilations(&self) -> Option<u64> {
        self.dispatcher
            .sandbox
            .try_lock()
            .ok()
            .map(|sandbox| sandbox.compilations())
    }

    /// Stop the listener: no further events are queued, the subscription
    /// is released, and the queue is closed. Already queued invocations
    /// still run.
    pub async fn teardown(self) {
        self.cancel.cancel();
        self.pump.abort();
        let unsubscribe = self.conn.stop_query(&self.query_id);
        self.queue.close();

        match unsubscribe.await {
            Ok(()) => {
                tracing::info!(
                    listener = %self.name,
                    query_id = %self.query_id,
                    "Listener stopped"
                );
            }
            Err(e) => {
                tracing::warn!(
                    listener = %self.name,
                    query_id = %self.query_id,
                    error = %e,
                    "Failed to unsubscribe listener",
                );
            }
        }
    }
}

/// Owns the sandbox and runs handlers against it.
struct Dispatcher {
    listener: String,
    code: String,
    host: Rc<ListenerHost>,
    sandbox: Mutex<ScriptSandbox<LuaEngine>>,
}

impl Dispatcher {
    async fn run(self: Rc<Self>, event: ListenerEvent, args: Vec<Value>) {
        let handler = event.handler_name();
        let mut sandbox = self.sandbox.lock().await;

        match sandbox.invoke(&self.code, handler, args).await {
            Ok(Some(_)) => {
                tracing::trace!(listener = %self.listener, handler, "Handler completed");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(listener = %self.listener, handler, error = %e, "Handler failed");
                self.host.log(LOG_ERROR, e.report().to_log_data());
            }
        }
    }
}

async fn pump_events(
    mut live: LiveQuery,
    dispatcher: Rc<Dispatcher>,
    queue: Rc<OrderingQueue>,
    cancel: CancellationToken,
) {
    loop {
        let events = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            events = live.next_events() => events,
        };
        let Some(events) = events else {
            tracing::debug!(listener = %dispatcher.listener, "Listener subscription ended");
            break;
        };

        for event in events {
            if cancel.is_cancelled() {
                return;
            }
            let (kind, args) = handler_call(&live, event);
            queue.enqueue(Rc::clone(&dispatcher).run(kind, args));
        }
    }
}

/// Map a view event onto the handler it triggers and its arguments.
fn handler_call(live: &LiveQuery, event: ViewEvent) -> (ListenerEvent, Vec<Value>) {
    let snapshot = snapshot_to_json(live.objects());
    match event {
        ViewEvent::Update => (ListenerEvent::Update, vec![snapshot]),
        ViewEvent::Add(entity) => (ListenerEvent::Add, vec![entity.to_json(), snapshot]),
        ViewEvent::Change(entity) => (ListenerEvent::Change, vec![entity.to_json(), snapshot]),
        ViewEvent::Remove(entity) => (ListenerEvent::Remove, vec![entity.to_json(), snapshot]),
        ViewEvent::Event {
            object,
            event,
            data,
        } => {
            let source = live
                .objects()
                .get(&object)
                .map(Entity::to_json)
                .unwrap_or(Value::Null);
            (
                ListenerEvent::Event,
                vec![source, Value::String(event), data, snapshot],
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use objwatch_client::QueryView;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn live() -> LiveQuery {
        let (_tx, rx) = mpsc::unbounded_channel();
        let view = QueryView::new(
            QueryId::Number(1),
            vec![Entity::new("sensors/1", json!({"v": 1}))],
        );
        LiveQuery::new(view, rx)
    }

    #[test]
    fn update_passes_snapshot() {
        let (kind, args) = handler_call(&live(), ViewEvent::Update);
        assert_eq!(kind, ListenerEvent::Update);
        assert_eq!(args, vec![json!({"sensors/1": {"name": "sensors/1", "value": {"v": 1}}})]);
    }

    #[test]
    fn change_passes_entity_then_snapshot() {
        let entity = Entity::new("sensors/1", json!({"v": 2}));
        let (kind, args) = handler_call(&live(), ViewEvent::Change(entity));
        assert_eq!(kind, ListenerEvent::Change);
        assert_eq!(args[0], json!({"name": "sensors/1", "value": {"v": 2}}));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn event_on_known_object_passes_source_entity() {
        let (kind, args) = handler_call(
            &live(),
            ViewEvent::Event {
                object: "sensors/1".into(),
                event: "blink".into(),
                data: json!({"n": 1}),
            },
        );
        assert_eq!(kind, ListenerEvent::Event);
        assert_eq!(args[0], json!({"name": "sensors/1", "value": {"v": 1}}));
        assert_eq!(args[1], json!("blink"));
        assert_eq!(args[2], json!({"n": 1}));
    }

    #[test]
    fn event_on_unknown_object_passes_null_source() {
        let (_, args) = handler_call(
            &live(),
            ViewEvent::Event {
                object: "sensors/9".into(),
                event: "blink".into(),
                data: Value::Null,
            },
        );
        assert_eq!(args[0], Value::Null);
    }
}
