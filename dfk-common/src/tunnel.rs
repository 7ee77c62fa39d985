//! Port forwarding over a channel.
//!
//! A [`PortForwarder`] listens on one endpoint and, for every accepted
//! socket, asks a [`Connector`] (usually living on the other side of the
//! channel) for an outbound connection, then splices the two with one relay
//! task per direction. Relays are independent of each other and of the
//! listener: closing a [`TunnelHandle`] only stops accepting.

use crate::channel::{BoxedStream, Connector, Endpoint};
use crate::types::PortSpec;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A running port forwarder.
#[derive(Debug)]
pub struct TunnelHandle {
    description: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_loop: JoinHandle<()>,
}

impl TunnelHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Stop accepting and release the listening socket.
    ///
    /// Returns once the accept loop has exited, so the port is free again.
    /// Relays for connections accepted earlier keep running until EOF.
    pub async fn close(self) {
        self.shutdown.cancel();
        if let Err(e) = self.accept_loop.await
            && e.is_panic()
        {
            debug!("Port forwarder {} panicked: {}", self.description, e);
        }
        debug!("Port forwarder {} closed", self.description);
    }
}

/// Entry point for starting forwarders.
pub struct PortForwarder;

impl PortForwarder {
    /// Bind `listen_port` on all interfaces of this host and forward every
    /// accepted connection to `host:port` via `connector`.
    pub async fn start(
        listen_port: u16,
        connector: Arc<dyn Connector>,
        host: impl Into<String>,
        port: u16,
    ) -> io::Result<TunnelHandle> {
        let listener = TcpListener::bind(("0.0.0.0", listen_port)).await?;
        Self::start_on(listener, connector, host.into(), port)
    }

    /// Like [`PortForwarder::start`] but bound to the loopback interface.
    pub async fn start_loopback(
        listen_port: u16,
        connector: Arc<dyn Connector>,
        host: impl Into<String>,
        port: u16,
    ) -> io::Result<TunnelHandle> {
        let listener = TcpListener::bind(("127.0.0.1", listen_port)).await?;
        Self::start_on(listener, connector, host.into(), port)
    }

    fn start_on(
        listener: TcpListener,
        connector: Arc<dyn Connector>,
        host: String,
        port: u16,
    ) -> io::Result<TunnelHandle> {
        let local_addr = listener.local_addr()?;
        let description = format!("{}->{}:{}", local_addr.port(), host, port);
        let shutdown = CancellationToken::new();
        info!("Port forwarder {} listening", description);

        let accept_loop = tokio::spawn(accept_loop(
            listener,
            connector,
            host,
            port,
            shutdown.clone(),
        ));

        Ok(TunnelHandle {
            description,
            local_addr,
            shutdown,
            accept_loop,
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    connector: Arc<dyn Connector>,
    host: String,
    port: u16,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer)) => {
                let connector = Arc::clone(&connector);
                let host = host.clone();
                tokio::spawn(async move {
                    if let Err(e) = forward_session(socket, connector, &host, port).await {
                        debug!(
                            "Port forwarding session from {} was shut down abnormally: {}",
                            peer, e
                        );
                    }
                });
            }
            Err(e) => {
                debug!("Port forwarder accept failed: {}", e);
                break;
            }
        }
    }
    // The listener drops here, refusing further connections.
}

async fn forward_session(
    socket: TcpStream,
    connector: Arc<dyn Connector>,
    host: &str,
    port: u16,
) -> io::Result<()> {
    let peer = socket.peer_addr()?;
    let outbound = connector.open(host, port).await?;
    debug!("Forwarding {} to {}:{}", peer, host, port);

    let (accepted_rx, accepted_tx) = socket.into_split();
    let (outbound_rx, outbound_tx) = tokio::io::split(outbound);

    tokio::spawn(relay(accepted_rx, outbound_tx, format!("{} -> {}:{}", peer, host, port)));
    tokio::spawn(relay(outbound_rx, accepted_tx, format!("{}:{} -> {}", host, port, peer)));
    Ok(())
}

/// Copy until EOF or error, then shut down the write half.
async fn relay<R, W>(mut from: R, mut to: W, label: String)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(&mut from, &mut to).await {
        Ok(bytes) => debug!("Relay {} finished after {} bytes", label, bytes),
        Err(e) => debug!("Relay {} failed: {}", label, e),
    }
    let _ = to.shutdown().await;
}

/// Dials plain TCP from the host it runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Box::new(stream))
    }
}

/// The endpoint for the host this process runs on.
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    name: String,
    loopback_only: bool,
}

impl LocalEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loopback_only: false,
        }
    }

    /// Bind tunnel listeners to 127.0.0.1 instead of every interface.
    pub fn loopback(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loopback_only: true,
        }
    }
}

#[async_trait]
impl Endpoint for LocalEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(TcpConnector)
    }

    async fn listen(
        &self,
        spec: &PortSpec,
        connector: Arc<dyn Connector>,
    ) -> io::Result<TunnelHandle> {
        if self.loopback_only {
            PortForwarder::start_loopback(
                spec.listen_port,
                connector,
                spec.forward_host.clone(),
                spec.forward_port,
            )
            .await
        } else {
            PortForwarder::start(
                spec.listen_port,
                connector,
                spec.forward_host.clone(),
                spec.forward_port,
            )
            .await
        }
    }
}
