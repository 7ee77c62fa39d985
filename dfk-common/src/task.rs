//! Units of work handed to the scheduler and the handles that track them.

use crate::channel::Endpoint;
use crate::launcher::Launcher;
use crate::types::{Label, Principal, WorkerId};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The worker a task was assigned to, as seen by the task.
#[derive(Clone)]
pub struct WorkerNode {
    pub id: WorkerId,
    /// Directory under which scratch dirs are created.
    pub root: PathBuf,
    pub launcher: Arc<dyn Launcher>,
    /// The worker's own end of the channel, for tunnels that listen or dial
    /// on the worker.
    pub endpoint: Arc<dyn Endpoint>,
}

impl fmt::Debug for WorkerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerNode")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Something the queue can run on a worker.
#[async_trait]
pub trait Executable: Send + Sync {
    /// Run on `node` and return the exit code. `abort` fires when the
    /// executor is being torn down underneath the task.
    async fn run(&self, node: &WorkerNode, abort: CancellationToken) -> i32;
}

/// A unit of remote work as submitted to the queue.
pub struct WorkDescriptor {
    /// `None` means any worker.
    pub label: Option<Label>,
    pub display_name: String,
    /// Milliseconds, or -1 when unknown.
    pub estimated_duration_ms: i64,
    /// Identity the task runs as.
    pub principal: Principal,
    pub work: Box<dyn Executable>,
}

impl fmt::Debug for WorkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkDescriptor")
            .field("label", &self.label)
            .field("display_name", &self.display_name)
            .field("estimated_duration_ms", &self.estimated_duration_ms)
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

/// How a queue item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { exit_code: i32 },
    Cancelled,
    Failed { reason: String },
}

/// Awaitable, cancellable reference to a queued task.
#[derive(Debug)]
pub struct QueueHandle {
    id: Uuid,
    display_name: String,
    outcome: oneshot::Receiver<TaskOutcome>,
    cancel: CancellationToken,
}

impl QueueHandle {
    /// Create a handle plus the sender the queue resolves it through.
    pub fn new(display_name: impl Into<String>) -> (Self, oneshot::Sender<TaskOutcome>) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            outcome: rx,
            cancel: CancellationToken::new(),
        };
        (handle, tx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Token the queue watches; cancelling it before the task starts
    /// resolves the handle as [`TaskOutcome::Cancelled`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the queue to resolve this task.
    pub async fn outcome(&mut self) -> TaskOutcome {
        match (&mut self.outcome).await {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Failed {
                reason: "queue dropped the task".to_string(),
            },
        }
    }
}
