//! Shared building blocks for distfork.
//!
//! This crate holds the data model of a remote fork (execution plans, port
//! specs, archive locations), the error taxonomy, configuration and logging
//! setup, the traits through which the dispatcher and the worker talk to
//! their external collaborators, and the port tunnel manager that both sides
//! of a channel run.

pub mod channel;
pub mod config;
pub mod errors;
pub mod launcher;
pub mod logging;
pub mod scheduler;
pub mod task;
pub mod tunnel;
pub mod types;
pub mod util;

pub use channel::{
    BoxedStream, ByteReader, ByteWriter, Channel, Connector, Endpoint, LocalChannel, MockChannel,
};
pub use config::{DfkConfig, EnvError, EnvParser};
pub use errors::{DfkError, ErrorCategory, ErrorCode, ErrorEntry, Result};
pub use launcher::{LaunchRequest, Launcher, StdStreams};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use scheduler::{ExecutionPool, Permission, PoolKind, Scheduler};
pub use task::{Executable, QueueHandle, TaskOutcome, WorkDescriptor, WorkerNode};
pub use tunnel::{LocalEndpoint, PortForwarder, TcpConnector, TunnelHandle};
pub use types::{
    ArchiveFormat, ArchiveLocation, ExecutionPlan, Label, PortSpec, Principal, WorkerId,
};
pub use util::{display_name_for, mask_env};
