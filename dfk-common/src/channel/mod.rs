//! The link between the dispatching side and the worker.
//!
//! A [`Channel`] is what the worker sees of the client: its standard streams,
//! its file system (for named archive paths) and an [`Endpoint`] that can
//! listen or dial on the client's host. Connectors are handed across the
//! channel by reference (`Arc<dyn Connector>`), so the listening side can ask
//! the far side for a fresh outbound connection per accepted socket.

mod local;
mod mock;

pub use local::LocalChannel;
pub use mock::{MockChannel, MockChannelBuilder, SharedBuffer};

use crate::tunnel::TunnelHandle;
use crate::types::PortSpec;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A bidirectional byte stream (a socket, or a proxy for one).
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Opens outbound connections from the side of the channel it lives on.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, host: &str, port: u16) -> io::Result<BoxedStream>;
}

/// One side of the channel, able to host tunnel listeners and hand out a
/// connector that dials from its host.
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Connector dialing from this endpoint's host.
    fn connector(&self) -> Arc<dyn Connector>;

    /// Listen on `spec.listen_port` here and relay every accepted connection
    /// through `connector` to `spec.forward_host:spec.forward_port`.
    async fn listen(
        &self,
        spec: &PortSpec,
        connector: Arc<dyn Connector>,
    ) -> io::Result<TunnelHandle>;
}

/// The worker's view of the dispatching client.
#[async_trait]
pub trait Channel: Send + Sync {
    fn stdin(&self) -> ByteReader;
    fn stdout(&self) -> ByteWriter;
    fn stderr(&self) -> ByteWriter;

    /// Open a named file on the dispatching side for reading.
    async fn open_read(&self, path: &str) -> io::Result<ByteReader>;

    /// Create (or truncate) a named file on the dispatching side.
    async fn open_write(&self, path: &str) -> io::Result<ByteWriter>;

    /// The dispatching side's endpoint.
    fn peer(&self) -> Arc<dyn Endpoint>;
}
