//! Channel for a dispatcher and worker sharing one host and process.

use super::{ByteReader, ByteWriter, Channel, Endpoint};
use crate::tunnel::LocalEndpoint;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Relays the current process's stdio and resolves named paths against the
/// client's working directory.
pub struct LocalChannel {
    base_dir: PathBuf,
    endpoint: Arc<LocalEndpoint>,
}

impl LocalChannel {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            endpoint: Arc::new(LocalEndpoint::new("client")),
        }
    }

    /// Use the current working directory as the base for named paths.
    pub fn current_dir() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[async_trait]
impl Channel for LocalChannel {
    fn stdin(&self) -> ByteReader {
        Box::new(tokio::io::stdin())
    }

    fn stdout(&self) -> ByteWriter {
        Box::new(tokio::io::stdout())
    }

    fn stderr(&self) -> ByteWriter {
        Box::new(tokio::io::stderr())
    }

    async fn open_read(&self, path: &str) -> io::Result<ByteReader> {
        let file = tokio::fs::File::open(self.resolve(path)).await?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> io::Result<ByteWriter> {
        let file = tokio::fs::File::create(self.resolve(path)).await?;
        Ok(Box::new(file))
    }

    fn peer(&self) -> Arc<dyn Endpoint> {
        self.endpoint.clone()
    }
}
