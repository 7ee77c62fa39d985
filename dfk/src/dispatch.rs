//! Dispatch and await.
//!
//! Admission is a courtesy check: it makes sure at least one reachable
//! worker or provisioner would let the principal build before the task is
//! queued, so a caller without permission gets an error instead of a task
//! that sits in the queue forever. It does not reserve anything; a worker
//! going away between the check and the submit leaves the task queued.

use dfk_common::{
    Channel, DfkError, ExecutionPlan, Label, Permission, Principal, QueueHandle, Scheduler,
    TaskOutcome, WorkDescriptor, display_name_for,
};
use dfk_wkr::TaskRunner;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the caller supplies for one remote fork.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub label: Option<Label>,
    /// Derived from the command when absent.
    pub display_name: Option<String>,
    /// Milliseconds, or -1 when unknown.
    pub estimated_duration_ms: i64,
    pub plan: ExecutionPlan,
    pub principal: Principal,
}

impl DispatchRequest {
    pub fn new(plan: ExecutionPlan, principal: Principal) -> Self {
        Self {
            label: None,
            display_name: None,
            estimated_duration_ms: -1,
            plan,
            principal,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(Label::new(label));
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Front door for submitting tasks and waiting on them.
#[derive(Clone)]
pub struct Dispatcher {
    scheduler: Arc<dyn Scheduler>,
}

impl Dispatcher {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Check that somewhere reachable for `label` lets `principal` build.
    pub fn admit(&self, label: Option<&Label>, principal: &Principal) -> Result<(), DfkError> {
        let pools = self.scheduler.reachable_pools(label)?;
        if pools.is_empty() {
            let target = label.map_or_else(|| "any label".to_string(), |l| l.to_string());
            return Err(DfkError::NoWorkerReachable(target));
        }
        if let Some(pool) = pools.iter().find(|p| p.may_build(principal)) {
            debug!("{} may build on {} ({:?})", principal, pool.name(), pool.kind());
            return Ok(());
        }
        warn!(
            "{} may not build on any of {} reachable pools",
            principal,
            pools.len()
        );
        Err(DfkError::AccessDenied {
            principal: principal.to_string(),
            permission: Permission::Build.name(),
        })
    }

    /// Admit and enqueue `descriptor`.
    pub fn submit(&self, descriptor: WorkDescriptor) -> Result<QueueHandle, DfkError> {
        self.admit(descriptor.label.as_ref(), &descriptor.principal)?;
        self.scheduler.submit(descriptor)
    }

    /// Wait for the task's exit code.
    ///
    /// If `interrupt` completes first the queued task is cancelled and
    /// [`DfkError::Interrupted`] returned.
    pub async fn await_exit<F>(&self, mut handle: QueueHandle, interrupt: F) -> Result<i32, DfkError>
    where
        F: Future<Output = ()>,
    {
        let cancel = handle.cancel_token();
        let id = handle.id();
        tokio::select! {
            outcome = handle.outcome() => match outcome {
                TaskOutcome::Completed { exit_code } => Ok(exit_code),
                TaskOutcome::Cancelled => Err(DfkError::Cancelled),
                TaskOutcome::Failed { reason } => Err(DfkError::TaskFailed(reason)),
            },
            _ = interrupt => {
                info!("Interrupted, cancelling task {}", id);
                cancel.cancel();
                Err(DfkError::Interrupted)
            }
        }
    }

    /// Run `request` remotely with its stdio relayed over `channel`.
    pub async fn dispatch<F>(
        &self,
        request: DispatchRequest,
        channel: Arc<dyn Channel>,
        interrupt: F,
    ) -> Result<i32, DfkError>
    where
        F: Future<Output = ()>,
    {
        request.plan.validate()?;

        let display_name = request
            .display_name
            .unwrap_or_else(|| display_name_for(request.plan.command()));
        let descriptor = WorkDescriptor {
            label: request.label,
            display_name,
            estimated_duration_ms: request.estimated_duration_ms,
            principal: request.principal,
            work: Box::new(TaskRunner::new(request.plan, channel)),
        };

        let handle = self.submit(descriptor)?;
        info!("Submitted task {} '{}'", handle.id(), handle.display_name());
        self.await_exit(handle, interrupt).await
    }
}
