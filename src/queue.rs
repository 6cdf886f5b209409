//! Ordered single-consumer work queue
//!
//! Serializes async work that would otherwise run concurrently. One worker
//! task pulls items off an unbounded channel and awaits each before taking
//! the next, so items finish in the order they were enqueued.
//!
//! ```text
//! Created ──start()──► Started ──dispose()──► Disposed
//!    └──────────────dispose()───────────────────┘
//! ```

use crate::error::{FeedError, FeedResult};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const TYPE_NAME: &str = "SequentialWorkQueue";

type WorkItem = BoxFuture<'static, ()>;

enum QueueState {
    Created {
        sender: mpsc::UnboundedSender<WorkItem>,
        receiver: mpsc::UnboundedReceiver<WorkItem>,
    },
    Started {
        sender: mpsc::UnboundedSender<WorkItem>,
        worker: JoinHandle<()>,
    },
    Disposed,
}

/// Runs enqueued futures one at a time, in order
pub struct SequentialWorkQueue {
    state: Mutex<QueueState>,
}

impl SequentialWorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(QueueState::Created { sender, receiver }),
        }
    }

    /// Spawn the worker on the current tokio runtime
    pub fn start(&self) -> FeedResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, QueueState::Disposed) {
            QueueState::Created { sender, mut receiver } => {
                let runtime = match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        *state = QueueState::Created { sender, receiver };
                        return Err(FeedError::InvalidOperation(format!(
                            "{} needs a tokio runtime to start: {}",
                            TYPE_NAME, e
                        )));
                    }
                };
                let worker = runtime.spawn(async move {
                    debug!("Work queue started");
                    while let Some(item) = receiver.recv().await {
                        item.await;
                    }
                    debug!("Work queue drained");
                });
                *state = QueueState::Started { sender, worker };
                Ok(())
            }
            started @ QueueState::Started { .. } => {
                *state = started;
                Err(FeedError::InvalidOperation(format!("{} is already started", TYPE_NAME)))
            }
            QueueState::Disposed => Err(FeedError::Disposed(TYPE_NAME)),
        }
    }

    /// Add a work item to the end of the queue
    pub fn enqueue<F>(&self, work: F) -> FeedResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            QueueState::Created { .. } => Err(FeedError::InvalidOperation(format!(
                "{} must be started before work is enqueued",
                TYPE_NAME
            ))),
            QueueState::Started { sender, .. } => sender
                .send(Box::pin(work))
                .map_err(|_| FeedError::Internal(format!("{} worker has stopped", TYPE_NAME))),
            QueueState::Disposed => Err(FeedError::Disposed(TYPE_NAME)),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            QueueState::Started { .. }
        )
    }

    /// Stop accepting work. Items already queued still run to completion in
    /// the background. Safe to call more than once, and before `start`.
    pub fn dispose(&self) {
        let _ = self.take_worker();
    }

    /// Stop accepting work and wait for queued items to finish
    pub async fn dispose_and_wait(&self) {
        if let Some(worker) = self.take_worker() {
            if let Err(e) = worker.await {
                warn!("Work queue worker failed: {}", e);
            }
        }
    }

    fn take_worker(&self) -> Option<JoinHandle<()>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, QueueState::Disposed) {
            // Dropping the sender ends the worker loop once the queue is empty
            QueueState::Started { worker, .. } => Some(worker),
            QueueState::Created { .. } | QueueState::Disposed => None,
        }
    }
}

impl Default for SequentialWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SequentialWorkQueue {
    fn drop(&mut self) {
        self.dispose();
    }
}
