//! In-memory channel for tests.
//!
//! Standard streams and named files live in shared buffers the test can
//! inspect after the run; the peer endpoint is a loopback-only
//! [`LocalEndpoint`] so tunnels still exercise real sockets.

use super::{ByteReader, ByteWriter, Channel, Endpoint};
use crate::tunnel::LocalEndpoint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Growable byte buffer shared between a writer and the test.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.inner).clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&lock(&self.inner)).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        lock(&self.inner).extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Reader over bytes shared by every `stdin()` handle.
#[derive(Debug, Clone, Default)]
struct SharedReader {
    inner: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl AsyncRead for SharedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut cursor = lock(&self.inner);
        let n = cursor.read(buf.initialize_unfilled())?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

type FileMap = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Appends into one named entry of the in-memory file map.
struct MemoryFileWriter {
    files: FileMap,
    name: String,
}

impl AsyncWrite for MemoryFileWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        lock(&self.files)
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Channel whose client side lives entirely in memory.
#[derive(Clone)]
pub struct MockChannel {
    stdin: SharedReader,
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    files: FileMap,
    endpoint: Arc<LocalEndpoint>,
}

impl MockChannel {
    pub fn builder() -> MockChannelBuilder {
        MockChannelBuilder::default()
    }

    pub fn stdout_buffer(&self) -> &SharedBuffer {
        &self.stdout
    }

    pub fn stderr_buffer(&self) -> &SharedBuffer {
        &self.stderr
    }

    /// Contents of a named client-side file, if it was written.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(name).cloned()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn stdin(&self) -> ByteReader {
        Box::new(self.stdin.clone())
    }

    fn stdout(&self) -> ByteWriter {
        Box::new(self.stdout.clone())
    }

    fn stderr(&self) -> ByteWriter {
        Box::new(self.stderr.clone())
    }

    async fn open_read(&self, path: &str) -> io::Result<ByteReader> {
        let data = lock(&self.files).get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{}: no such file", path))
        })?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn open_write(&self, path: &str) -> io::Result<ByteWriter> {
        lock(&self.files).insert(path.to_string(), Vec::new());
        Ok(Box::new(MemoryFileWriter {
            files: Arc::clone(&self.files),
            name: path.to_string(),
        }))
    }

    fn peer(&self) -> Arc<dyn Endpoint> {
        self.endpoint.clone()
    }
}

#[derive(Debug, Default)]
pub struct MockChannelBuilder {
    stdin: Vec<u8>,
    files: HashMap<String, Vec<u8>>,
}

impl MockChannelBuilder {
    /// Bytes the worker will read from the client's stdin.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = data.into();
        self
    }

    /// Seed a client-side file.
    pub fn file(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.into(), data.into());
        self
    }

    pub fn build(self) -> MockChannel {
        MockChannel {
            stdin: SharedReader {
                inner: Arc::new(Mutex::new(Cursor::new(self.stdin))),
            },
            stdout: SharedBuffer::new(),
            stderr: SharedBuffer::new(),
            files: Arc::new(Mutex::new(self.files)),
            endpoint: Arc::new(LocalEndpoint::loopback("mock-client")),
        }
    }
}
