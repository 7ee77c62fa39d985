//! Error taxonomy and catalog for distfork.
//!
//! [`DfkError`] is the error type returned by every library operation. Each
//! variant maps onto an [`ErrorCode`] from the catalog, which carries a stable
//! `DFK-Exxx` code and remediation hints for the CLI.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                          |
//! |------------|-------------|--------------------------------------|
//! | E001-E099  | Config      | Configuration and setup errors       |
//! | E100-E199  | Submission  | Admission and queue errors           |
//! | E200-E299  | Execution   | Staging, launch and collection       |
//! | E300-E399  | Tunnel      | Port forwarding errors               |
//! | E500-E599  | Internal    | Internal/unexpected errors           |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};

use thiserror::Error;

/// Errors surfaced by dispatch, execution and tunneling.
#[derive(Debug, Error)]
pub enum DfkError {
    /// The request was malformed before reaching the queue (e.g. no command).
    #[error("{0}")]
    SubmissionRejected(String),

    /// No reachable worker or provisioner grants the principal `permission`.
    #[error("{principal} is missing the {permission} permission")]
    AccessDenied {
        principal: String,
        permission: &'static str,
    },

    #[error("No such label: {0}")]
    NoSuchLabel(String),

    #[error("No worker or provisioner is reachable for {0}")]
    NoWorkerReachable(String),

    #[error("Failed to stage input files: {reason}")]
    StagingFailed {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to launch {command}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Aborted")]
    Aborted,

    #[error("Task cancelled")]
    Cancelled,

    #[error("Interrupted while waiting for the task")]
    Interrupted,

    #[error("Illegal port forwarding specification: {0}")]
    PortSpecInvalid(String),

    #[error("Failed to set up port forwarding {spec}")]
    TunnelFailed {
        spec: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy back files: {reason}")]
    CollectFailed {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid environment override: {0}")]
    ConfigEnv(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = DfkError> = std::result::Result<T, E>;

impl DfkError {
    pub fn staging(reason: impl Into<String>, source: std::io::Error) -> Self {
        Self::StagingFailed {
            reason: reason.into(),
            source: Some(source),
        }
    }

    pub fn collect(reason: impl Into<String>, source: std::io::Error) -> Self {
        Self::CollectFailed {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Catalog entry for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SubmissionRejected(_) => ErrorCode::SubmissionRejected,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::NoSuchLabel(_) => ErrorCode::NoSuchLabel,
            Self::NoWorkerReachable(_) => ErrorCode::NoWorkerReachable,
            Self::StagingFailed { .. } => ErrorCode::StagingFailed,
            Self::LaunchFailed { .. } => ErrorCode::LaunchFailed,
            Self::Aborted => ErrorCode::Aborted,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Interrupted => ErrorCode::Interrupted,
            Self::PortSpecInvalid(_) => ErrorCode::PortSpecInvalid,
            Self::TunnelFailed { .. } => ErrorCode::TunnelFailed,
            Self::CollectFailed { .. } => ErrorCode::CollectFailed,
            Self::TaskFailed(_) => ErrorCode::TaskFailed,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::ConfigEnv(_) => ErrorCode::ConfigEnvError,
            Self::Io(_) => ErrorCode::InternalIo,
        }
    }

    /// Render the error and its cause chain, one cause per line.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
