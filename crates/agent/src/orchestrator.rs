//! Keeps one [`ListenerSession`] per listener object in the store.
//!
//! The orchestrator subscribes to the listener namespace and starts,
//! restarts or stops sessions as listener objects are added, changed or
//! removed. Lifecycle changes go through their own [`OrderingQueue`], so a
//! restart always finishes tearing down the old session before the new one
//! subscribes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use objwatch_client::{Connection, ViewEvent};
use objwatch_core::types::Entity;

use crate::error::AgentError;
use crate::ordering::OrderingQueue;
use crate::session::ListenerSession;

type Registry = Rc<RefCell<HashMap<String, ListenerSession>>>;

/// Listener registry and lifecycle driver. Cheap to clone; clones share
/// state. Must be used inside a [`tokio::task::LocalSet`].
#[derive(Clone)]
pub struct Orchestrator {
    conn: Arc<Connection>,
    pattern: String,
    sessions: Registry,
    lifecycle: Rc<OrderingQueue>,
}

impl Orchestrator {
    pub fn new(conn: Arc<Connection>, pattern: impl Into<String>) -> Self {
        Self {
            conn,
            pattern: pattern.into(),
            sessions: Rc::new(RefCell::new(HashMap::new())),
            lifecycle: Rc::new(OrderingQueue::new("listener-lifecycle")),
        }
    }

    /// Names of listeners with a running session, sorted.
    pub fn active_listeners(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of script builds of a running listener.
    pub fn compilations(&self, listener: &str) -> Option<u64> {
        self.sessions
            .borrow()
            .get(listener)
            .and_then(ListenerSession::compilations)
    }

    /// Subscribe to the listener namespace and follow it.
    ///
    /// Only returns when the subscription fails or ends, which happens when
    /// the connection is lost.
    pub async fn run(&self) -> AgentError {
        let mut live = match self.conn.query(&self.pattern).await {
            Ok(live) => live,
            Err(e) => return AgentError::ListenerQuery(e),
        };

        tracing::info!(
            pattern = %self.pattern,
            listeners = live.objects().len(),
            "Watching listeners",
        );

        for entity in live.objects().values() {
            self.schedule_start(entity.clone());
        }

        while let Some(events) = live.next_events().await {
            for event in events {
                match event {
                    ViewEvent::Add(entity) => self.schedule_start(entity),
                    ViewEvent::Change(entity) => self.schedule_restart(entity),
                    ViewEvent::Remove(entity) => self.schedule_stop(entity.name),
                    ViewEvent::Update | ViewEvent::Event { .. } => {}
                }
            }
        }

        AgentError::ListenerQueryEnded
    }

    /// Stop every session and wait for queued lifecycle work.
    pub async fn shutdown(&self) {
        let names = self.active_listeners();
        for name in names {
            self.schedule_stop(name);
        }
        self.lifecycle.drain().await;
    }

    fn schedule_start(&self, entity: Entity) {
        let this = self.clone();
        self.lifecycle.enqueue(async move { this.start(entity).await });
    }

    fn schedule_restart(&self, entity: Entity) {
        let this = self.clone();
        self.lifecycle.enqueue(async move {
            tracing::info!(listener = %entity.name, "Listener changed, restarting");
            this.stop(&entity.name).await;
            this.start(entity).await;
        });
    }

    fn schedule_stop(&self, name: String) {
        let this = self.clone();
        self.lifecycle.enqueue(async move { this.stop(&name).await });
    }

    async fn start(&self, entity: Entity) {
        // A repeated add for a running listener replaces it.
        self.stop(&entity.name).await;

        match ListenerSession::start(&entity, Arc::clone(&self.conn)).await {
            Ok(session) => {
                self.sessions
                    .borrow_mut()
                    .insert(entity.name.clone(), session);
            }
            Err(e) => {
                tracing::error!(listener = %entity.name, error = %e, "Failed to start listener");
            }
        }
    }

    async fn stop(&self, name: &str) {
        let session = self.sessions.borrow_mut().remove(name);
        if let Some(session) = session {
            session.teardown().await;
        }
    }
}
