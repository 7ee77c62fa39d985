//! Worker-side execution of one remote fork.
//!
//! A [`TaskRunner`] walks a fixed sequence of states:
//!
//! ```text
//! Idle -> Staging -> Running -> Collecting -> Cleanup -> Done
//! ```
//!
//! Staging creates a `distfork*` scratch directory under the worker root,
//! unpacks the input archive and copies single files in. Tunnels come up
//! between staging and launch. Running captures the reference timestamp and
//! waits for the child. Collecting packs everything modified since that
//! timestamp and copies single files back. Cleanup always runs: the scratch
//! directory is removed and every tunnel closed, with failures logged only.

use crate::archive;
use async_trait::async_trait;
use dfk_common::{
    ArchiveLocation, Channel, DfkError, Executable, ExecutionPlan, LaunchRequest, StdStreams,
    TunnelHandle, WorkerNode,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Prefix of every scratch directory.
pub const SCRATCH_PREFIX: &str = "distfork";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Staging,
    Running,
    Collecting,
    Cleanup,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Staging => "staging",
            Self::Running => "running",
            Self::Collecting => "collecting",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Resources that must be released however the run ends.
#[derive(Default)]
struct Held {
    scratch: Option<TempDir>,
    tunnels: Vec<TunnelHandle>,
}

/// Runs an [`ExecutionPlan`] on whichever worker the queue picked.
pub struct TaskRunner {
    plan: Arc<ExecutionPlan>,
    channel: Arc<dyn Channel>,
}

impl TaskRunner {
    pub fn new(plan: ExecutionPlan, channel: Arc<dyn Channel>) -> Self {
        Self {
            plan: Arc::new(plan),
            channel,
        }
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    fn program(&self) -> &str {
        self.plan.command().first().map(String::as_str).unwrap_or("")
    }

    fn transition(&self, state: &mut RunState, next: RunState) {
        debug!("Task {}: {} -> {}", self.program(), state, next);
        *state = next;
    }

    /// Print a line on the client's stderr. Failures are logged and dropped.
    async fn tell(&self, line: &str) {
        let mut stderr = self.channel.stderr();
        let written: std::io::Result<()> = async {
            stderr.write_all(line.as_bytes()).await?;
            stderr.write_all(b"\n").await?;
            stderr.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!("Could not report to client: {}", e);
        }
    }

    async fn execute(
        &self,
        node: &WorkerNode,
        abort: &CancellationToken,
        state: &mut RunState,
        held: &mut Held,
    ) -> Result<i32, DfkError> {
        self.transition(state, RunState::Staging);
        let workdir = self.create_scratch(&node.root, held).await?;
        self.stage(&workdir).await?;
        self.open_tunnels(node, held).await?;

        self.transition(state, RunState::Running);
        let reference = SystemTime::now();
        let request = LaunchRequest {
            command: self.plan.command().to_vec(),
            env: self.plan.env.clone(),
            working_dir: workdir.clone(),
        };
        let io = StdStreams {
            stdin: self.channel.stdin(),
            stdout: self.channel.stdout(),
            stderr: self.channel.stderr(),
        };
        let exit_code = tokio::select! {
            biased;
            _ = abort.cancelled() => return Err(DfkError::Aborted),
            result = node.launcher.launch(request, io) => result?,
        };

        if self.plan.output.is_some() || !self.plan.copy_out.is_empty() {
            self.transition(state, RunState::Collecting);
            self.collect(&workdir, reference).await?;
        }
        Ok(exit_code)
    }

    async fn create_scratch(&self, root: &Path, held: &mut Held) -> Result<PathBuf, DfkError> {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            DfkError::staging(format!("cannot create worker root {}", root.display()), e)
        })?;
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(root)
            .map_err(|e| DfkError::staging("cannot create scratch directory", e))?;
        let path = scratch.path().to_path_buf();
        debug!("Scratch directory {}", path.display());
        held.scratch = Some(scratch);
        Ok(path)
    }

    async fn stage(&self, workdir: &Path) -> Result<(), DfkError> {
        if let Some(input) = &self.plan.input {
            let mut reader = match input {
                ArchiveLocation::Inline(_) => self.channel.stdin(),
                ArchiveLocation::Path(path) => self
                    .channel
                    .open_read(path)
                    .await
                    .map_err(|e| DfkError::staging(format!("cannot open {}", path), e))?,
            };
            let mut data = Vec::new();
            reader
                .read_to_end(&mut data)
                .await
                .map_err(|e| DfkError::staging(format!("cannot read {}", input), e))?;
            info!("Extracting {} ({} bytes)", input, data.len());
            archive::extract(input.format(), data, workdir.to_path_buf())
                .await
                .map_err(|e| DfkError::staging(format!("cannot extract {}", input), e))?;
        }

        for path in &self.plan.copy_in {
            let name = Path::new(path).file_name().ok_or_else(|| DfkError::StagingFailed {
                reason: format!("{} does not name a file", path),
                source: None,
            })?;
            let mut reader = self
                .channel
                .open_read(path)
                .await
                .map_err(|e| DfkError::staging(format!("cannot open {}", path), e))?;
            let mut file = tokio::fs::File::create(workdir.join(name))
                .await
                .map_err(|e| DfkError::staging(format!("cannot create {}", path), e))?;
            tokio::io::copy(&mut reader, &mut file)
                .await
                .map_err(|e| DfkError::staging(format!("cannot copy {}", path), e))?;
            file.flush()
                .await
                .map_err(|e| DfkError::staging(format!("cannot copy {}", path), e))?;
        }
        Ok(())
    }

    async fn open_tunnels(&self, node: &WorkerNode, held: &mut Held) -> Result<(), DfkError> {
        let client = self.channel.peer();

        for spec in &self.plan.local_forwards {
            let handle = client
                .listen(spec, node.endpoint.connector())
                .await
                .map_err(|source| DfkError::TunnelFailed {
                    spec: format!("-L {}", spec),
                    source,
                })?;
            info!("Forwarding {} on {} via {}", spec, client.name(), node.id);
            held.tunnels.push(handle);
        }

        for spec in &self.plan.remote_forwards {
            let handle = node
                .endpoint
                .listen(spec, client.connector())
                .await
                .map_err(|source| DfkError::TunnelFailed {
                    spec: format!("-R {}", spec),
                    source,
                })?;
            info!("Forwarding {} on {} via {}", spec, node.id, client.name());
            held.tunnels.push(handle);
        }
        Ok(())
    }

    async fn collect(&self, workdir: &Path, reference: SystemTime) -> Result<(), DfkError> {
        if let Some(output) = &self.plan.output {
            self.tell("Copying back files").await;
            let writer = match output {
                ArchiveLocation::Inline(_) => self.channel.stdout(),
                ArchiveLocation::Path(path) => self
                    .channel
                    .open_write(path)
                    .await
                    .map_err(|e| DfkError::collect(format!("cannot create {}", path), e))?,
            };
            let count = archive::pack(output.format(), workdir.to_path_buf(), reference, writer)
                .await
                .map_err(|e| DfkError::collect(format!("cannot write {}", output), e))?;
            info!("Packed {} changed files into {}", count, output);
        }

        for path in &self.plan.copy_out {
            let mut file = tokio::fs::File::open(workdir.join(path))
                .await
                .map_err(|e| DfkError::collect(format!("cannot open {}", path), e))?;
            let mut writer = self
                .channel
                .open_write(path)
                .await
                .map_err(|e| DfkError::collect(format!("cannot create {}", path), e))?;
            tokio::io::copy(&mut file, &mut writer)
                .await
                .map_err(|e| DfkError::collect(format!("cannot copy {}", path), e))?;
            writer
                .shutdown()
                .await
                .map_err(|e| DfkError::collect(format!("cannot copy {}", path), e))?;
        }
        Ok(())
    }

    async fn cleanup(&self, held: Held) {
        if let Some(scratch) = held.scratch {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
        }
        for tunnel in held.tunnels {
            tunnel.close().await;
        }
    }
}

#[async_trait]
impl Executable for TaskRunner {
    async fn run(&self, node: &WorkerNode, abort: CancellationToken) -> i32 {
        let mut state = RunState::Idle;
        let mut held = Held::default();

        self.tell(&format!("Executing on {}", node.id)).await;
        let result = self.execute(node, &abort, &mut state, &mut held).await;

        self.transition(&mut state, RunState::Cleanup);
        self.cleanup(held).await;
        self.transition(&mut state, RunState::Done);

        match result {
            Ok(code) => code,
            Err(DfkError::Aborted) => {
                warn!("Task {} aborted on {}", self.program(), node.id);
                self.tell("ERROR: Aborted").await;
                -1
            }
            Err(e) => {
                error!("Task failed on {} [{}]: {}", node.id, e.code(), e);
                self.tell(&format!("ERROR: Failed to execute a process: {}", e.report()))
                    .await;
                -1
            }
        }
    }
}
