//! Per-owner FIFO task queue.
//!
//! An [`OrderingQueue`] runs the futures handed to [`OrderingQueue::enqueue`]
//! one at a time, in submission order, on a dedicated local worker task.
//! Queues are independent of each other. Must be created inside a
//! [`tokio::task::LocalSet`].
//!
//! Dropping a queue closes it; the detached worker still finishes what
//! was already queued.

use std::cell::RefCell;
use std::future::Future;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Task = LocalBoxFuture<'static, ()>;

/// Serial executor for one listener (or for listener lifecycle changes).
pub struct OrderingQueue {
    label: String,
    tx: RefCell<Option<mpsc::UnboundedSender<Task>>>,
    worker: RefCell<Option<JoinHandle<()>>>,
}

impl OrderingQueue {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_local(run_worker(label.clone(), rx));
        Self {
            label,
            tx: RefCell::new(Some(tx)),
            worker: RefCell::new(Some(worker)),
        }
    }

    /// Append `task`. It starts after every earlier task has completed,
    /// never inline with the caller.
    ///
    /// Returns `false` (and drops the task) once the queue is closed.
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + 'static,
    {
        let accepted = match self.tx.borrow().as_ref() {
            Some(tx) => tx.send(task.boxed_local()).is_ok(),
            None => false,
        };
        if !accepted {
            tracing::debug!(queue = %self.label, "Task rejected by closed queue");
        }
        accepted
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn close(&self) {
        if self.tx.borrow_mut().take().is_some() {
            tracing::debug!(queue = %self.label, "Queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.borrow().is_none()
    }

    /// Close the queue and wait until every queued task has completed.
    pub async fn drain(&self) {
        self.close();
        let worker = self.worker.borrow_mut().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(queue = %self.label, error = %e, "Queue worker failed");
            }
        }
    }
}

async fn run_worker(label: String, mut rx: mpsc::UnboundedReceiver<Task>) {
    let mut completed: u64 = 0;
    while let Some(task) = rx.recv().await {
        task.await;
        completed += 1;
    }
    tracing::debug!(queue = %label, completed, "Queue drained");
}
