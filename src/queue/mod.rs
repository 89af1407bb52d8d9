//! # Operation Queue
//!
//! Single-flight serialization for coordinator operations.
//!
//! ## Overview
//!
//! ```text
//! submit(kind, options, op)
//!        |
//!   classify(kind, bypass)
//!    /            \
//! Bypass        Serialize
//!    |              |
//! spawn now     FIFO backlog -> drain task (one operation at a time)
//! ```
//!
//! Serialized operations execute in submission order, strictly one at a
//! time; the next is dequeued only after the current operation's future
//! settles. Bypassed operations run concurrently with whatever the queue is
//! draining; the classification table in [`classify`] is what makes that
//! sound. The drain task is spawned on demand and exits when the backlog
//! empties (`Idle -> Draining -> Idle`).

pub mod classify;

pub use classify::{classify, OperationKind, Route};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{CoordinatorError, Result};

/// Per-submission options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Request immediate execution. Ignored (with a warning) for pinned
    /// kinds.
    pub bypass_queue: bool,
}

impl SubmitOptions {
    pub fn bypass() -> Self {
        Self { bypass_queue: true }
    }
}

/// Drain-loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Draining,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub bypassed: u64,
    pub serialized: u64,
    pub completed: u64,
    pub failed: u64,
    pub depth: usize,
    pub state: QueueState,
}

/// Resolves with the result of a submitted operation.
///
/// Dropping the ticket detaches from the operation without cancelling it;
/// a reset queue resolves pending tickets with
/// [`CoordinatorError::QueueClosed`].
#[derive(Debug)]
pub struct OperationTicket<T> {
    rx: oneshot::Receiver<Result<T>>,
    kind: OperationKind,
    route: Route,
}

impl<T> OperationTicket<T> {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The route classification actually applied.
    pub fn route(&self) -> Route {
        self.route
    }

    /// Wait for the operation to settle.
    pub async fn outcome(self) -> Result<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(CoordinatorError::QueueClosed),
        }
    }
}

/// Erased operation: runs the caller's future, delivers its result through
/// the ticket, reports success to the drain loop for stats.
type QueuedOperation = BoxFuture<'static, bool>;

struct QueueInner {
    backlog: VecDeque<QueuedOperation>,
    state: QueueState,
    submitted: u64,
    bypassed: u64,
    serialized: u64,
    completed: u64,
    failed: u64,
}

impl QueueInner {
    fn new() -> Self {
        Self {
            backlog: VecDeque::new(),
            state: QueueState::Idle,
            submitted: 0,
            bypassed: 0,
            serialized: 0,
            completed: 0,
            failed: 0,
        }
    }

    fn record_settled(&mut self, succeeded: bool) {
        if succeeded {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// FIFO operation queue with classification-driven bypass.
pub struct OperationQueue {
    inner: Arc<Mutex<QueueInner>>,
    warn_depth: usize,
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

impl OperationQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::new())),
            warn_depth: config.warn_depth.max(1),
        }
    }

    /// Submit an operation for routed execution.
    ///
    /// Must be called within a Tokio runtime: both routes execute on
    /// spawned tasks. The returned ticket resolves with the operation's
    /// own result, success or error.
    pub fn submit<T, F, Fut>(
        &self,
        kind: OperationKind,
        options: SubmitOptions,
        op: F,
    ) -> OperationTicket<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let route = classify(kind, options.bypass_queue);
        let (tx, rx) = oneshot::channel();

        let wrapped = async move {
            let result = op().await;
            let succeeded = result.is_ok();
            // The caller may have dropped the ticket; the operation's
            // effects stand either way.
            let _ = tx.send(result);
            succeeded
        };

        match route {
            Route::Bypass => {
                {
                    let mut inner = self.inner.lock();
                    inner.submitted += 1;
                    inner.bypassed += 1;
                }
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let succeeded = wrapped.await;
                    inner.lock().record_settled(succeeded);
                });
            }
            Route::Serialize => {
                let mut inner = self.inner.lock();
                inner.submitted += 1;
                inner.serialized += 1;
                inner.backlog.push_back(Box::pin(wrapped));

                let depth = inner.backlog.len();
                if depth >= self.warn_depth {
                    warn!(kind = %kind, depth, "Operation queue backlog is deep");
                }

                if inner.state == QueueState::Idle {
                    inner.state = QueueState::Draining;
                    drop(inner);
                    tokio::spawn(drain(Arc::clone(&self.inner)));
                }
            }
        }

        debug!(kind = %kind, route = ?route, "Submitted operation");
        OperationTicket { rx, kind, route }
    }

    /// Queued-but-unstarted serialized operations.
    pub fn depth(&self) -> usize {
        self.inner.lock().backlog.len()
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            submitted: inner.submitted,
            bypassed: inner.bypassed,
            serialized: inner.serialized,
            completed: inner.completed,
            failed: inner.failed,
            depth: inner.backlog.len(),
            state: inner.state,
        }
    }

    /// Drop queued-but-unstarted operations and zero the statistics.
    ///
    /// Dropped operations resolve their tickets with `QueueClosed`. An
    /// operation already executing finishes undisturbed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.backlog.len();
        inner.backlog.clear();
        inner.submitted = 0;
        inner.bypassed = 0;
        inner.serialized = 0;
        inner.completed = 0;
        inner.failed = 0;

        if dropped > 0 {
            info!(dropped, "Operation queue reset, pending operations cancelled");
        }
    }
}

/// Single-flight drain loop: dequeue, await, record, repeat until empty.
async fn drain(inner: Arc<Mutex<QueueInner>>) {
    loop {
        let next = {
            let mut guard = inner.lock();
            match guard.backlog.pop_front() {
                Some(op) => op,
                None => {
                    guard.state = QueueState::Idle;
                    return;
                }
            }
        };

        let succeeded = next.await;
        inner.lock().record_settled(succeeded);
    }
}
