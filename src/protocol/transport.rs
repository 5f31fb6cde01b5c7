//! Byte-level duplex channel to one ICE Bloc module.
//!
//! The transport is the only component that touches the network. It does not
//! frame, retry or reconnect: `receive` returns whatever one read produced, up to
//! a fixed ceiling, and the codec decides what those bytes mean.

use crate::error::{IceBlocError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Anything the transport can run over (a TCP stream, or an in-memory duplex in tests).
pub trait TransportIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> TransportIo for T {}
type DynIo = Box<dyn TransportIo>;

/// Open connection to one module, before it is split between caller and reader task.
pub struct Transport {
    io: DynIo,
    peer: String,
    max_frame_bytes: usize,
}

impl Transport {
    /// Connect to `host:port`.
    ///
    /// # Errors
    /// [`IceBlocError::Connection`] if the peer refuses, is unreachable, or does not
    /// accept within `connect_timeout`.
    pub async fn open(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        max_frame_bytes: usize,
    ) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                IceBlocError::connection(&peer, format!("connect timed out after {connect_timeout:?}"))
            })?
            .map_err(|e| IceBlocError::io(&peer, "connect failed", e))?;

        // Requests are tiny and latency bound
        stream
            .set_nodelay(true)
            .map_err(|e| IceBlocError::io(&peer, "set_nodelay failed", e))?;

        tracing::info!(peer = %peer, "Connected to ICE Bloc module");
        Ok(Self::from_stream(stream, peer, max_frame_bytes))
    }

    /// Wrap an already connected stream.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>, max_frame_bytes: usize) -> Self
    where
        S: TransportIo + 'static,
    {
        Self {
            io: Box::new(stream),
            peer: peer.into(),
            max_frame_bytes,
        }
    }

    /// Remote `host:port`.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Split into the receive side (owned by the reader task) and the send side.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        let (read, write) = tokio::io::split(self.io);
        (
            TransportReader {
                inner: read,
                peer: self.peer.clone(),
                buf: vec![0u8; self.max_frame_bytes],
            },
            TransportWriter {
                inner: Some(write),
                peer: self.peer,
            },
        )
    }
}

/// Receive half of a [`Transport`].
pub struct TransportReader {
    inner: ReadHalf<DynIo>,
    peer: String,
    buf: Vec<u8>,
}

impl TransportReader {
    /// Receive ceiling in bytes.
    pub fn limit(&self) -> usize {
        self.buf.len()
    }

    /// Wait for the next chunk and return it, at most [`limit`](Self::limit) bytes.
    ///
    /// # Errors
    /// [`IceBlocError::Connection`] on EOF or a read failure.
    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        let n = self
            .inner
            .read(&mut self.buf)
            .await
            .map_err(|e| IceBlocError::io(&self.peer, "read failed", e))?;
        if n == 0 {
            return Err(IceBlocError::connection(&self.peer, "connection closed by peer"));
        }
        tracing::trace!(peer = %self.peer, bytes = n, "received chunk");
        Ok(self.buf[..n].to_vec())
    }
}

/// Send half of a [`Transport`].
pub struct TransportWriter {
    inner: Option<WriteHalf<DynIo>>,
    peer: String,
}

impl TransportWriter {
    /// Remote `host:port`.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write the whole buffer.
    ///
    /// # Errors
    /// [`IceBlocError::Connection`] on a broken pipe or after [`close`](Self::close).
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let peer = &self.peer;
        let stream = self
            .inner
            .as_mut()
            .ok_or_else(|| IceBlocError::connection(peer, "send on closed connection"))?;
        stream
            .write_all(bytes)
            .await
            .map_err(|e| IceBlocError::io(peer, "write failed", e))?;
        stream
            .flush()
            .await
            .map_err(|e| IceBlocError::io(peer, "flush failed", e))?;
        Ok(())
    }

    /// Shut down the send side. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.inner.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(peer = %self.peer, error = %e, "shutdown on close failed");
            }
        }
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}
