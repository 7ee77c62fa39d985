use dfk_common::{
    DfkError, ExecutionPool, Label, PoolKind, Principal, QueueHandle, Scheduler, TaskOutcome,
    WorkDescriptor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Pool that grants build to everyone, or to a single principal.
pub struct OpenPool {
    name: String,
    only: Option<String>,
}

impl OpenPool {
    pub fn new(name: &str) -> Arc<dyn ExecutionPool> {
        Arc::new(Self {
            name: name.to_string(),
            only: None,
        })
    }

    pub fn restricted(name: &str, principal: &str) -> Arc<dyn ExecutionPool> {
        Arc::new(Self {
            name: name.to_string(),
            only: Some(principal.to_string()),
        })
    }
}

impl ExecutionPool for OpenPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PoolKind {
        PoolKind::Worker
    }

    fn may_build(&self, principal: &Principal) -> bool {
        self.only.as_deref().is_none_or(|p| p == principal.as_str())
    }
}

type Pending = (oneshot::Sender<TaskOutcome>, CancellationToken);

/// Scheduler that records every interaction and never runs anything. Tests
/// resolve the queued handles themselves.
pub struct CountingScheduler {
    pools: Vec<Arc<dyn ExecutionPool>>,
    lookups: AtomicUsize,
    submits: AtomicUsize,
    names: Mutex<Vec<String>>,
    pending: Mutex<Vec<Pending>>,
}

impl CountingScheduler {
    pub fn new(pools: Vec<Arc<dyn ExecutionPool>>) -> Arc<Self> {
        Arc::new(Self {
            pools,
            lookups: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn display_names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }

    /// Cancellation tokens of every handle handed out so far.
    pub fn cancel_tokens(&self) -> Vec<CancellationToken> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }

    /// Resolve every queued handle with `outcome`.
    pub fn resolve_all(&self, outcome: TaskOutcome) {
        for (tx, _) in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(outcome.clone());
        }
    }
}

impl Scheduler for CountingScheduler {
    fn reachable_pools(
        &self,
        _label: Option<&Label>,
    ) -> Result<Vec<Arc<dyn ExecutionPool>>, DfkError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.pools.clone())
    }

    fn submit(&self, descriptor: WorkDescriptor) -> Result<QueueHandle, DfkError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.names
            .lock()
            .unwrap()
            .push(descriptor.display_name.clone());
        let (handle, tx) = QueueHandle::new(descriptor.display_name);
        self.pending
            .lock()
            .unwrap()
            .push((tx, handle.cancel_token()));
        Ok(handle)
    }
}
