//! Error catalog for distfork.
//!
//! Every [`ErrorCode`] has a stable `DFK-Exxx` code, a message template and
//! remediation steps printed by the CLI under the error itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering every distfork failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file could not be read or parsed
    ConfigInvalid,
    /// Environment variable has invalid value
    ConfigEnvError,

    // =========================================================================
    // Submission Errors (E100-E199)
    // =========================================================================
    /// No command given
    SubmissionRejected,
    /// Principal lacks build permission everywhere
    AccessDenied,
    /// Label matches no worker or provisioner
    NoSuchLabel,
    /// Nothing online could ever run the task
    NoWorkerReachable,
    /// Queue item cancelled before completion
    Cancelled,
    /// Caller stopped waiting
    Interrupted,
    /// Queue reported a failure
    TaskFailed,

    // =========================================================================
    // Execution Errors (E200-E299)
    // =========================================================================
    /// Input archive or copy-in file unreadable
    StagingFailed,
    /// Process could not start
    LaunchFailed,
    /// Executor interrupted while the process ran
    Aborted,
    /// Output archive or copy-out failed
    CollectFailed,

    // =========================================================================
    // Tunnel Errors (E300-E399)
    // =========================================================================
    /// Malformed `port:host:port`
    PortSpecInvalid,
    /// Listener could not be bound
    TunnelFailed,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Unclassified I/O failure
    InternalIo,
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Submission,
    Execution,
    Tunnel,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Submission => write!(f, "submission"),
            Self::Execution => write!(f, "execution"),
            Self::Tunnel => write!(f, "tunnel"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Catalog entry describing an error code.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: &'static str,
    pub remediation: &'static [&'static str],
}

impl ErrorCode {
    pub fn entry(&self) -> ErrorEntry {
        let (code, category, message, remediation): (_, _, _, &'static [&'static str]) =
            match self {
                Self::ConfigInvalid => (
                    "DFK-E001",
                    ErrorCategory::Config,
                    "Configuration could not be loaded",
                    &[
                        "Check the TOML syntax of the config file",
                        "Pass --config to point at a different file",
                    ],
                ),
                Self::ConfigEnvError => (
                    "DFK-E002",
                    ErrorCategory::Config,
                    "Environment override has an invalid value",
                    &["Unset or fix the DFK_* variable named in the message"],
                ),
                Self::SubmissionRejected => (
                    "DFK-E100",
                    ErrorCategory::Submission,
                    "The request was rejected before submission",
                    &["Pass the command to run after the options"],
                ),
                Self::AccessDenied => (
                    "DFK-E101",
                    ErrorCategory::Submission,
                    "Missing build permission on every reachable worker",
                    &[
                        "Ask an administrator to add you to build_principals",
                        "Pick a label whose workers you may build on",
                    ],
                ),
                Self::NoSuchLabel => (
                    "DFK-E102",
                    ErrorCategory::Submission,
                    "No worker or provisioner carries the label",
                    &["Check the spelling of -l", "List labels in the [[workers]] config"],
                ),
                Self::NoWorkerReachable => (
                    "DFK-E103",
                    ErrorCategory::Submission,
                    "No online worker or provisioner can take the task",
                    &["Bring a matching worker online or add a cloud"],
                ),
                Self::Cancelled => (
                    "DFK-E104",
                    ErrorCategory::Submission,
                    "The queued task was cancelled",
                    &["Resubmit the command"],
                ),
                Self::Interrupted => (
                    "DFK-E105",
                    ErrorCategory::Submission,
                    "Stopped waiting for the task; it was cancelled",
                    &[],
                ),
                Self::TaskFailed => (
                    "DFK-E106",
                    ErrorCategory::Submission,
                    "The queue failed the task",
                    &["Re-run with -v for executor logs"],
                ),
                Self::StagingFailed => (
                    "DFK-E200",
                    ErrorCategory::Execution,
                    "Input files could not be staged",
                    &[
                        "Check that the archive is a valid zip or gzip tarball",
                        "Use =zip or =tgz when piping the archive through stdin",
                    ],
                ),
                Self::LaunchFailed => (
                    "DFK-E201",
                    ErrorCategory::Execution,
                    "The command could not be started",
                    &["Check that the executable exists on the worker's PATH"],
                ),
                Self::Aborted => (
                    "DFK-E202",
                    ErrorCategory::Execution,
                    "The worker aborted the running command",
                    &[],
                ),
                Self::CollectFailed => (
                    "DFK-E203",
                    ErrorCategory::Execution,
                    "Produced files could not be copied back",
                    &["Check that the destination path is writable"],
                ),
                Self::PortSpecInvalid => (
                    "DFK-E300",
                    ErrorCategory::Tunnel,
                    "Port forwarding must be PORT:HOST:PORT",
                    &["Example: -L 8080:localhost:80"],
                ),
                Self::TunnelFailed => (
                    "DFK-E301",
                    ErrorCategory::Tunnel,
                    "A port forwarding listener could not be opened",
                    &["Pick a listening port that is free on that side"],
                ),
                Self::InternalIo => (
                    "DFK-E500",
                    ErrorCategory::Internal,
                    "Unexpected I/O failure",
                    &["Re-run with -v and report the log"],
                ),
            };
        ErrorEntry {
            code,
            category,
            message,
            remediation,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entry().code)
    }
}
