//! Framed transport
//!
//! Wraps a byte stream and moves whole length-prefixed frames in and out of
//! it. Every read and write is bounded by a deadline so a stalled peer
//! cannot pin its connection task.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

use crate::error::{GatewayError, NetworkError, ProtocolError, Result};
use crate::net::buffer::{wrap_frame, LENGTH_PREFIX_SIZE, MIN_FRAME_SIZE};

/// Read/write deadlines applied to a transport
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub read: Duration,
    pub write: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(120),
            write: Duration::from_secs(10),
        }
    }
}

/// Frame-oriented transport over any async byte stream
pub struct FrameTransport<S> {
    stream: S,
    deadlines: Deadlines,
}

impl<S> FrameTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new transport
    pub fn new(stream: S, deadlines: Deadlines) -> Self {
        Self { stream, deadlines }
    }

    /// Get a mutable reference to the underlying stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Read one frame and return its body (everything after the length prefix).
    ///
    /// The body may still be ciphertext; decryption happens above this layer.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; LENGTH_PREFIX_SIZE];
        self.read_exact_timed(&mut header).await?;

        let total = u16::from_le_bytes(header) as usize;
        if total < MIN_FRAME_SIZE {
            return Err(ProtocolError::InvalidPacketSize {
                expected: MIN_FRAME_SIZE,
                actual: total,
            }
            .into());
        }

        let mut body = vec![0u8; total - LENGTH_PREFIX_SIZE];
        self.read_exact_timed(&mut body).await?;
        trace!(len = total, "Read frame");
        Ok(body)
    }

    /// Write one frame around an already-assembled body
    pub async fn write_frame(&mut self, body: &[u8]) -> Result<()> {
        let frame = wrap_frame(body)?;
        let write = async {
            self.stream.write_all(&frame).await?;
            self.stream.flush().await
        };

        match timeout(self.deadlines.write, write).await {
            Ok(Ok(())) => {
                trace!(len = frame.len(), "Wrote frame");
                Ok(())
            }
            Ok(Err(e)) => Err(NetworkError::WriteError(e.to_string()).into()),
            Err(_) => Err(NetworkError::Timeout.into()),
        }
    }

    /// Shutdown the stream
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| GatewayError::Network(NetworkError::WriteError(e.to_string())))
    }

    async fn read_exact_timed(&mut self, buf: &mut [u8]) -> Result<()> {
        match timeout(self.deadlines.read, self.stream.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(NetworkError::ConnectionClosed.into())
            }
            Ok(Err(e)) => Err(NetworkError::ReadError(e.to_string()).into()),
            Err(_) => Err(NetworkError::Timeout.into()),
        }
    }
}
