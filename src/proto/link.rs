//! Byte-level serial channel.
//!
//! [`Link`] owns the open port and offers the two primitives everything else
//! is built on: "read until this delimiter shows up" and "write these bytes".
//! Reads are bounded by an inactivity timeout per chunk. Hitting the timeout
//! is not an error; it is reported as [`ReadOutcome::TimedOut`] together with
//! whatever arrived so far.

use bytes::{Bytes, BytesMut};
use std::{pin::Pin, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use super::codec::FrameCodec;
use super::command::Command;
use super::{ProtoError, Result};

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Result of a single [`Link::read_until`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The delimiter was seen; the bytes end with it.
    Complete(Bytes),
    /// The channel went quiet before the delimiter arrived.
    TimedOut(Bytes),
}

impl ReadOutcome {
    pub fn bytes(&self) -> &Bytes {
        match self {
            ReadOutcome::Complete(b) | ReadOutcome::TimedOut(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            ReadOutcome::Complete(b) | ReadOutcome::TimedOut(b) => b,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ReadOutcome::Complete(_))
    }
}

pub struct Link {
    io: Option<Pin<Box<dyn AsyncReadWrite>>>,
    codec: FrameCodec,
    buffer: BytesMut,
    timeout: Duration,
}

impl Link {
    pub fn open(port: impl AsRef<str>, baudrate: u32, timeout: Duration) -> Result<Self> {
        let port = port.as_ref();
        let connection_error = |source| ProtoError::Connection {
            port: port.to_string(),
            source,
        };

        #[allow(unused_mut)]
        let mut stream = tokio_serial::new(port, baudrate)
            .timeout(timeout)
            .open_native_async()
            .map_err(connection_error)?;

        #[cfg(unix)]
        stream.set_exclusive(false).map_err(connection_error)?;

        debug!("Opened {} at {} baud", port, baudrate);
        Ok(Self::from_io(stream, timeout))
    }

    /// Wraps an already open byte stream.
    pub fn from_io(io: impl AsyncReadWrite + 'static, timeout: Duration) -> Self {
        Self {
            io: Some(Box::pin(io)),
            codec: FrameCodec::default(),
            buffer: BytesMut::with_capacity(4096),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    pub async fn read_until(&mut self, delimiter: &[u8]) -> Result<ReadOutcome> {
        self.codec.set_delimiter(delimiter);
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                trace!("<< {:?}", String::from_utf8_lossy(&frame));
                return Ok(ReadOutcome::Complete(frame));
            }

            let io = self.io.as_mut().ok_or(ProtoError::Abort)?;
            match tokio::time::timeout(self.timeout, io.read_buf(&mut self.buffer)).await {
                Err(_elapsed) => {
                    let partial = self.buffer.split().freeze();
                    trace!("<< {:?} (timed out)", String::from_utf8_lossy(&partial));
                    return Ok(ReadOutcome::TimedOut(partial));
                }
                Ok(Ok(0)) => {
                    return match self.codec.decode_eof(&mut self.buffer)? {
                        Some(frame) => Ok(ReadOutcome::Complete(frame)),
                        None => Err(ProtoError::Abort),
                    };
                }
                Ok(Ok(_n)) => {}
                Ok(Err(err)) => return Err(err.into()),
            }
        }
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let io = self.io.as_mut().ok_or(ProtoError::Abort)?;
        trace!(">> {:?}", String::from_utf8_lossy(bytes));
        io.write_all(bytes).await?;
        io.flush().await?;
        Ok(())
    }

    /// Writes `cmd` followed by the line terminator.
    pub async fn send(&mut self, cmd: Command) -> Result<()> {
        let mut out = BytesMut::new();
        self.codec.encode(cmd, &mut out)?;
        self.write(&out).await
    }

    /// Releases the port. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut io) = self.io.take() {
            self.buffer.clear();
            io.shutdown().await?;
            debug!("Link closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::fake::FakeInstrument;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_read_until_complete_keeps_remainder() {
        let fake = FakeInstrument::new().with_pending(b"one\r\ntwo\r\n");
        let mut link = Link::from_io(fake, TIMEOUT);
        let first = link.read_until(b"\r\n").await.unwrap();
        assert_eq!(first, ReadOutcome::Complete(Bytes::from_static(b"one\r\n")));
        let second = link.read_until(b"\r\n").await.unwrap();
        assert_eq!(second, ReadOutcome::Complete(Bytes::from_static(b"two\r\n")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_until_times_out_with_partial() {
        let fake = FakeInstrument::new().with_pending(b"ch> ");
        let mut link = Link::from_io(fake, TIMEOUT);
        let outcome = link.read_until(b"\n").await.unwrap();
        assert_eq!(outcome, ReadOutcome::TimedOut(Bytes::from_static(b"ch> ")));
        let outcome = link.read_until(b"\n").await.unwrap();
        assert!(outcome.bytes().is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_port() {
        let port = "/dev/nanovna_ctrl_missing_port";
        match Link::open(port, crate::DEFAULT_BAUDRATE, crate::DEFAULT_READ_TIMEOUT) {
            Err(ProtoError::Connection { port: failed, .. }) => assert_eq!(failed, port),
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_silent_read() {
        let mut link = Link::from_io(FakeInstrument::new(), TIMEOUT);
        assert_eq!(link.timeout(), TIMEOUT);
        let start = tokio::time::Instant::now();
        let outcome = link.read_until(b"\n").await.unwrap();
        assert!(!outcome.is_complete());
        assert!(start.elapsed() >= link.timeout());
        assert!(start.elapsed() < link.timeout() * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let mut link = Link::from_io(FakeInstrument::new(), TIMEOUT);
        link.close().await.unwrap();
        link.close().await.unwrap();
        assert!(!link.is_open());
        assert!(matches!(
            link.read_until(b"\n").await,
            Err(ProtoError::Abort)
        ));
        assert!(matches!(link.write(b"x").await, Err(ProtoError::Abort)));
    }
}
