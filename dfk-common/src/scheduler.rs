//! Scheduler host interface.
//!
//! Admission asks the scheduler for every execution pool a label can reach
//! (online workers and provisioners alike) and checks whether any of them
//! lets the principal build. Pools answer for themselves, so the check does
//! not care which kind of pool it is looking at.

use crate::errors::DfkError;
use crate::task::{QueueHandle, WorkDescriptor};
use crate::types::{Label, Principal};
use std::fmt;
use std::sync::Arc;

/// Permissions consulted during admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Run tasks on a worker.
    Build,
    /// Bring up new workers from a cloud.
    Provision,
}

impl Permission {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Build => "Worker.Build",
            Self::Provision => "Cloud.Provision",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Worker,
    Provisioner,
}

/// A place a task could end up executing.
pub trait ExecutionPool: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> PoolKind;
    /// Whether `principal` could get a task built here.
    fn may_build(&self, principal: &Principal) -> bool;
}

/// The external job queue.
pub trait Scheduler: Send + Sync {
    /// Every online worker and provisioner matching `label` (all of them for
    /// `None`). Fails with [`DfkError::NoSuchLabel`] when the label names
    /// nothing at all.
    fn reachable_pools(&self, label: Option<&Label>)
    -> Result<Vec<Arc<dyn ExecutionPool>>, DfkError>;

    /// Enqueue `descriptor`; the returned handle resolves when it finishes.
    fn submit(&self, descriptor: WorkDescriptor) -> Result<QueueHandle, DfkError>;
}
