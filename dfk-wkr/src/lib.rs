//! distfork worker side.
//!
//! Everything that happens on the node a task was assigned to: staging the
//! input archive into a scratch directory, running the command with its
//! standard streams wired to the channel, and packing whatever changed into
//! the output archive.

#![forbid(unsafe_code)]

pub mod archive;
pub mod differ;
pub mod launcher;
pub mod runner;

pub use archive::{extract, pack};
pub use differ::{DiffEntry, FileFilter, ModifiedSince, RootCutOff, scan};
pub use launcher::ProcessLauncher;
pub use runner::{RunState, TaskRunner};
