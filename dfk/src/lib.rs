//! distfork client side.
//!
//! The [`Dispatcher`] turns a command line into a queued task, checks that
//! somewhere reachable would let the caller build it, and waits for the exit
//! code. [`LocalQueue`] is the in-process queue that hands tasks to the
//! workers named in the configuration.

#![forbid(unsafe_code)]

pub mod cli;
pub mod dispatch;
pub mod policy;
pub mod queue;

pub use dispatch::{DispatchRequest, Dispatcher};
pub use policy::{Acl, CloudPool, WorkerPool};
pub use queue::LocalQueue;
