//! Process launcher interface.

use crate::channel::{ByteReader, ByteWriter};
use crate::errors::DfkError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What to start and where.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub command: Vec<String>,
    /// Overrides merged on top of the worker's own environment.
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
}

/// Streams the child's stdio is wired to.
pub struct StdStreams {
    pub stdin: ByteReader,
    pub stdout: ByteWriter,
    pub stderr: ByteWriter,
}

/// Starts a subprocess and waits for it.
///
/// Dropping the returned future must terminate the child.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run to completion and return the exit code.
    async fn launch(&self, request: LaunchRequest, io: StdStreams) -> Result<i32, DfkError>;
}
