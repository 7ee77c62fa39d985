//! Subprocess launcher backed by `tokio::process`.

use async_trait::async_trait;
use dfk_common::{DfkError, LaunchRequest, Launcher, StdStreams, mask_env};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Runs commands as local child processes of this worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, request: LaunchRequest, io: StdStreams) -> Result<i32, DfkError> {
        let command_line = request.command.join(" ");
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| DfkError::SubmissionRejected("No commands are specified".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&request.env)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!("Launching {} in {}", command_line, request.working_dir.display());
        if !request.env.is_empty() {
            debug!("Environment overrides: {}", mask_env(&request.env));
        }

        let mut child = cmd.spawn().map_err(|source| DfkError::LaunchFailed {
            command: command_line.clone(),
            source,
        })?;

        let StdStreams {
            stdin: mut from_client,
            stdout: mut to_stdout,
            stderr: mut to_stderr,
        } = io;

        let stdin_pump = child.stdin.take().map(|mut child_stdin| {
            tokio::spawn(async move {
                if let Err(e) = tokio::io::copy(&mut from_client, &mut child_stdin).await {
                    debug!("stdin relay ended: {}", e);
                }
                let _ = child_stdin.shutdown().await;
            })
        });
        let mut pumps = Pumps {
            stdin: stdin_pump,
            outputs: Vec::with_capacity(2),
        };
        if let Some(mut child_stdout) = child.stdout.take() {
            pumps.outputs.push(tokio::spawn(async move {
                if let Err(e) = tokio::io::copy(&mut child_stdout, &mut to_stdout).await {
                    debug!("stdout relay ended: {}", e);
                }
                let _ = to_stdout.flush().await;
            }));
        }
        if let Some(mut child_stderr) = child.stderr.take() {
            pumps.outputs.push(tokio::spawn(async move {
                if let Err(e) = tokio::io::copy(&mut child_stderr, &mut to_stderr).await {
                    debug!("stderr relay ended: {}", e);
                }
                let _ = to_stderr.flush().await;
            }));
        }

        let status = child.wait().await;

        // Output pumps drain what the child left in its pipes; stdin may
        // still be blocked on the client and is aborted with the guard.
        for pump in &mut pumps.outputs {
            let _ = pump.await;
        }
        drop(pumps);

        let code = exit_code(status?);
        debug!("{} exited with {}", command_line, code);
        Ok(code)
    }
}

/// Relay tasks of one child. Dropping the guard aborts whatever is still
/// running, so a dropped launch leaves nothing behind.
struct Pumps {
    stdin: Option<JoinHandle<()>>,
    outputs: Vec<JoinHandle<()>>,
}

impl Drop for Pumps {
    fn drop(&mut self) {
        if let Some(pump) = &self.stdin {
            pump.abort();
        }
        for pump in &self.outputs {
            pump.abort();
        }
    }
}

/// Exit code of a finished child. A child killed by a signal reports
/// `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfk_common::channel::SharedBuffer;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn request(command: &[&str], dir: PathBuf) -> LaunchRequest {
        LaunchRequest {
            command: command.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            working_dir: dir,
        }
    }

    fn streams(stdin: &'static [u8]) -> (StdStreams, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let io = StdStreams {
            stdin: Box::new(stdin),
            stdout: Box::new(out.clone()),
            stderr: Box::new(err.clone()),
        };
        (io, out, err)
    }

    #[tokio::test]
    async fn test_launch_relays_streams_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let (io, out, err) = streams(b"piped input");
        let code = ProcessLauncher
            .launch(
                request(&["sh", "-c", "cat; echo oops >&2; exit 7"], dir.path().into()),
                io,
            )
            .await
            .unwrap();

        assert_eq!(code, 7);
        assert_eq!(out.to_string_lossy(), "piped input");
        assert_eq!(err.to_string_lossy(), "oops\n");
    }

    #[tokio::test]
    async fn test_launch_merges_env_and_uses_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let mut req = request(&["sh", "-c", "ls; printf %s \"$GREETING\""], dir.path().into());
        req.env.insert("GREETING".to_string(), "hi".to_string());
        let (io, out, _) = streams(b"");

        ProcessLauncher.launch(req, io).await.unwrap();
        assert_eq!(out.to_string_lossy(), "marker\nhi");
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (io, _, _) = streams(b"");
        let err = ProcessLauncher
            .launch(request(&["nonexistent_command_12345"], dir.path().into()), io)
            .await
            .unwrap_err();
        assert!(matches!(err, DfkError::LaunchFailed { .. }));
    }
}
