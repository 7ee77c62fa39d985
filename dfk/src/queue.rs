//! In-process task queue.
//!
//! Each configured worker gets a semaphore with one permit per executor. A
//! submitted task waits for a permit on any online worker carrying its label
//! and then runs on its own tokio task. Cancelling the handle only has an
//! effect while the task is still waiting; once started it runs to
//! completion (or until the queue is shut down, which aborts it).
//!
//! Admission is best effort: a task whose label only matches offline workers
//! or provisioners is accepted and stays queued until one comes online or the
//! task is cancelled.

use crate::policy::{CloudPool, WorkerPool};
use dfk_common::{
    DfkConfig, DfkError, ExecutionPool, Label, LocalEndpoint, QueueHandle, Scheduler, TaskOutcome,
    WorkDescriptor, WorkerId, WorkerNode,
};
use dfk_wkr::ProcessLauncher;
use futures::future::{BoxFuture, FutureExt, select_all};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct QueuedWorker {
    node: Arc<WorkerNode>,
    labels: Vec<String>,
    online: bool,
    executors: Arc<Semaphore>,
    pool: Arc<WorkerPool>,
}

impl QueuedWorker {
    /// A worker's own name doubles as a label.
    fn carries(&self, label: &Label) -> bool {
        label.as_str() == self.node.id.as_str() || label.matches(&self.labels)
    }
}

struct QueuedCloud {
    labels: Vec<String>,
    pool: Arc<CloudPool>,
}

impl QueuedCloud {
    fn carries(&self, label: &Label) -> bool {
        label.as_str() == self.pool.name() || label.matches(&self.labels)
    }
}

/// Queue running tasks on workers inside this process.
pub struct LocalQueue {
    workers: Vec<QueuedWorker>,
    clouds: Vec<QueuedCloud>,
    shutdown: CancellationToken,
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalQueue {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
            clouds: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Build workers and clouds from the configuration, launching processes
    /// locally under each worker's root.
    pub fn from_config(config: &DfkConfig) -> Self {
        let mut queue = Self::new();
        for worker in &config.workers {
            let node = WorkerNode {
                id: WorkerId::new(&worker.name),
                root: config.worker_root(worker),
                launcher: Arc::new(ProcessLauncher),
                endpoint: Arc::new(LocalEndpoint::new(&worker.name)),
            };
            queue.add_worker(
                node,
                worker.labels.clone(),
                worker.executors as usize,
                worker.online,
                WorkerPool::from_config(worker, &config.security),
            );
        }
        for cloud in &config.clouds {
            queue.add_cloud(
                cloud.labels.clone(),
                CloudPool::from_config(cloud, &config.security),
            );
        }
        debug!(
            "Queue has {} workers and {} clouds",
            queue.workers.len(),
            queue.clouds.len()
        );
        queue
    }

    pub fn add_worker(
        &mut self,
        node: WorkerNode,
        labels: Vec<String>,
        executors: usize,
        online: bool,
        pool: WorkerPool,
    ) {
        self.workers.push(QueuedWorker {
            node: Arc::new(node),
            labels,
            online,
            executors: Arc::new(Semaphore::new(executors.max(1))),
            pool: Arc::new(pool),
        });
    }

    pub fn add_cloud(&mut self, labels: Vec<String>, pool: CloudPool) {
        self.clouds.push(QueuedCloud {
            labels,
            pool: Arc::new(pool),
        });
    }

    /// Abort every running task, as if its executor went away.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn online_workers<'a>(
        &'a self,
        label: Option<&'a Label>,
    ) -> impl Iterator<Item = &'a QueuedWorker> + 'a {
        self.workers
            .iter()
            .filter(move |w| w.online && label.is_none_or(|l| w.carries(l)))
    }
}

type Slot = (Arc<WorkerNode>, OwnedSemaphorePermit);

/// Wait for an executor on any of the candidate workers. Never resolves when
/// there are no candidates.
async fn acquire_any(candidates: Vec<(Arc<WorkerNode>, Arc<Semaphore>)>) -> Option<Slot> {
    if candidates.is_empty() {
        return std::future::pending().await;
    }
    let waits: Vec<BoxFuture<'static, Option<Slot>>> = candidates
        .into_iter()
        .map(|(node, executors)| {
            async move { executors.acquire_owned().await.ok().map(|permit| (node, permit)) }
                .boxed()
        })
        .collect();
    let (slot, _, _) = select_all(waits).await;
    slot
}

impl Scheduler for LocalQueue {
    fn reachable_pools(
        &self,
        label: Option<&Label>,
    ) -> Result<Vec<Arc<dyn ExecutionPool>>, DfkError> {
        if let Some(label) = label {
            let known = self.workers.iter().any(|w| w.carries(label))
                || self.clouds.iter().any(|c| c.carries(label));
            if !known {
                return Err(DfkError::NoSuchLabel(label.to_string()));
            }
        }

        // A named label counts offline workers too; the task then waits for
        // one of them to come back.
        let mut pools: Vec<Arc<dyn ExecutionPool>> = Vec::new();
        let matching = self.workers.iter().filter(|w| match label {
            Some(label) => w.carries(label),
            None => w.online,
        });
        for worker in matching {
            pools.push(worker.pool.clone());
        }
        for cloud in &self.clouds {
            if label.is_none_or(|l| cloud.carries(l)) {
                pools.push(cloud.pool.clone());
            }
        }
        Ok(pools)
    }

    fn submit(&self, descriptor: WorkDescriptor) -> Result<QueueHandle, DfkError> {
        let (handle, outcome) = QueueHandle::new(descriptor.display_name.clone());
        let id = handle.id();
        let cancel = handle.cancel_token();
        let abort = self.shutdown.child_token();
        let candidates: Vec<_> = self
            .online_workers(descriptor.label.as_ref())
            .map(|w| (Arc::clone(&w.node), Arc::clone(&w.executors)))
            .collect();

        info!(
            "Queued task {} '{}' for {} (label: {}, {} candidate workers)",
            id,
            descriptor.display_name,
            descriptor.principal,
            descriptor
                .label
                .as_ref()
                .map(Label::as_str)
                .unwrap_or("any"),
            candidates.len()
        );

        tokio::spawn(async move {
            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Task {} cancelled while queued", id);
                    let _ = outcome.send(TaskOutcome::Cancelled);
                    return;
                }
                slot = acquire_any(candidates) => slot,
            };
            let Some((node, _permit)) = slot else {
                let _ = outcome.send(TaskOutcome::Failed {
                    reason: "executor pool closed".to_string(),
                });
                return;
            };

            info!(
                "Task {} started on {} (estimated {} ms)",
                id, node.id, descriptor.estimated_duration_ms
            );
            let exit_code = descriptor.work.run(&node, abort).await;
            info!("Task {} finished on {} with {}", id, node.id, exit_code);
            let _ = outcome.send(TaskOutcome::Completed { exit_code });
        });

        Ok(handle)
    }
}
