//! Common types used across distfork components.

use crate::errors::DfkError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a worker node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability label narrowing which workers may run a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a node or provisioner carrying `labels` satisfies this label.
    pub fn matches<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        labels.iter().any(|l| l.as_ref() == self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of whoever submitted a task.
///
/// Carried inside the work descriptor so the task later runs with the
/// submitting identity rather than whatever is ambient on the executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(pub String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    /// The principal of the user running this process.
    pub fn current() -> Self {
        Self(whoami_name())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn whoami_name() -> String {
    std::env::var("DFK_PRINCIPAL")
        .unwrap_or_else(|_| whoami::username().unwrap_or_else(|_| "anonymous".to_string()))
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single `-L`/`-R` port forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port the listening side binds.
    pub listen_port: u16,
    /// Host the connecting side dials.
    pub forward_host: String,
    /// Port the connecting side dials.
    pub forward_port: u16,
}

impl PortSpec {
    pub fn new(listen_port: u16, forward_host: impl Into<String>, forward_port: u16) -> Self {
        Self {
            listen_port,
            forward_host: forward_host.into(),
            forward_port,
        }
    }
}

impl FromStr for PortSpec {
    type Err = DfkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split(':').collect();
        let [listen, host, port] = tokens.as_slice() else {
            return Err(DfkError::PortSpecInvalid(s.to_string()));
        };
        let invalid = || DfkError::PortSpecInvalid(s.to_string());
        let listen_port = listen.parse::<u16>().map_err(|_| invalid())?;
        let forward_port = port.parse::<u16>().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(listen_port, *host, forward_port))
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.listen_port, self.forward_host, self.forward_port
        )
    }
}

/// Archive flavours understood for staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Pick the format from a file name or marker: anything ending in `zip`
    /// is a zip archive, everything else a gzip-compressed tarball.
    pub fn for_name(name: &str) -> Self {
        if name.ends_with("zip") {
            Self::Zip
        } else {
            Self::TarGz
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::Zip => "=zip",
            Self::TarGz => "=tgz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => write!(f, "zip"),
            Self::TarGz => write!(f, "tgz"),
        }
    }
}

/// Where an input archive comes from or an output archive goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveLocation {
    /// A named file on the dispatching side of the channel.
    Path(String),
    /// The channel's stdin (input) or stdout (output).
    Inline(ArchiveFormat),
}

impl ArchiveLocation {
    /// Parse a CLI value: `=zip` and `=tgz` select the inline stream,
    /// anything else is a path.
    pub fn parse(value: &str) -> Self {
        match value {
            "=zip" => Self::Inline(ArchiveFormat::Zip),
            "=tgz" => Self::Inline(ArchiveFormat::TarGz),
            path => Self::Path(path.to_string()),
        }
    }

    pub fn format(&self) -> ArchiveFormat {
        match self {
            Self::Path(path) => ArchiveFormat::for_name(path),
            Self::Inline(format) => *format,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }
}

impl FromStr for ArchiveLocation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path),
            Self::Inline(format) => write!(f, "{}", format.marker()),
        }
    }
}

/// Everything the worker needs to run one remote fork.
///
/// Built once from caller input and never mutated after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub input: Option<ArchiveLocation>,
    #[serde(default)]
    pub output: Option<ArchiveLocation>,
    /// Files on the dispatching side copied into the scratch dir by base name.
    #[serde(default)]
    pub copy_in: Vec<String>,
    /// Scratch-relative files copied back to the dispatching side.
    #[serde(default)]
    pub copy_out: Vec<String>,
    /// Listen on the dispatching side, connect from the worker.
    #[serde(default)]
    pub local_forwards: Vec<PortSpec>,
    /// Listen on the worker, connect from the dispatching side.
    #[serde(default)]
    pub remote_forwards: Vec<PortSpec>,
}

impl ExecutionPlan {
    /// Create a plan for `command`, rejecting an empty command vector.
    pub fn new<I, S>(command: I) -> Result<Self, DfkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        if command.is_empty() {
            return Err(DfkError::SubmissionRejected(
                "No commands are specified".to_string(),
            ));
        }
        Ok(Self {
            command,
            env: BTreeMap::new(),
            input: None,
            output: None,
            copy_in: Vec::new(),
            copy_out: Vec::new(),
            local_forwards: Vec::new(),
            remote_forwards: Vec::new(),
        })
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Re-check the plan after deserialization, which bypasses `new`.
    pub fn validate(&self) -> Result<(), DfkError> {
        if self.command.is_empty() {
            return Err(DfkError::SubmissionRejected(
                "No commands are specified".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_input(mut self, input: ArchiveLocation) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: ArchiveLocation) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_copy_in(mut self, path: impl Into<String>) -> Self {
        self.copy_in.push(path.into());
        self
    }

    pub fn with_copy_out(mut self, path: impl Into<String>) -> Self {
        self.copy_out.push(path.into());
        self
    }

    pub fn with_local_forward(mut self, spec: PortSpec) -> Self {
        self.local_forwards.push(spec);
        self
    }

    pub fn with_remote_forward(mut self, spec: PortSpec) -> Self {
        self.remote_forwards.push(spec);
        self
    }

    pub fn has_tunnels(&self) -> bool {
        !self.local_forwards.is_empty() || !self.remote_forwards.is_empty()
    }
}
