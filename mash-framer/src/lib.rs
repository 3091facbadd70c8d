#![forbid(unsafe_code)]
//! Length-prefixed byte-stream framing.
//!
//! Each frame on the wire is a 4-byte big-endian length prefix followed by
//! exactly that many payload bytes. A single `max_message_size` bound
//! applies to both directions. The reader and writer halves are split and
//! each guarded by their own [`tokio::sync::Mutex`] so one write in flight
//! never blocks a concurrent read, while concurrent writers still serialize
//! onto a single prefix-then-payload sequence.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65_536;

/// Failures from [`Framer::read_frame`] and [`Framer::write_frame`].
#[derive(Debug)]
pub enum FrameError {
    /// The stream ended cleanly before any prefix byte was read.
    Eof,
    /// The stream ended mid-prefix or mid-payload.
    Truncated,
    /// A write was attempted with zero payload bytes.
    EmptyFrame,
    /// The frame's declared length exceeded `max_message_size`.
    MessageTooLarge { len: usize, max: usize },
    Io(std::io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Eof => write!(f, "stream closed cleanly before a new frame"),
            FrameError::Truncated => write!(f, "stream ended mid-frame"),
            FrameError::EmptyFrame => write!(f, "frame payload must not be empty"),
            FrameError::MessageTooLarge { len, max } => {
                write!(f, "frame of {len} bytes exceeds max_message_size of {max}")
            }
            FrameError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e)
    }
}

/// Direction a [`FrameEvent`] was observed travelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// A structured observation of one frame crossing the wire, handed to an
/// optional [`FrameObserver`]. `sample` holds at most the first 4096 bytes
/// of the payload.
#[derive(Clone, Debug)]
pub struct FrameEvent<'a> {
    pub direction: Direction,
    pub connection_id: uuid::Uuid,
    /// Total bytes on the wire, including the 4-byte prefix.
    pub frame_size: usize,
    pub sample: &'a [u8],
    pub truncated: bool,
}

/// Sink for [`FrameEvent`]s. Implementors must not block; the framer calls
/// this synchronously on the hot path.
pub trait FrameObserver: Send + Sync {
    fn on_frame(&self, event: FrameEvent<'_>);
}

struct Inner<S> {
    reader: AsyncMutex<tokio::io::ReadHalf<S>>,
    writer: AsyncMutex<tokio::io::WriteHalf<S>>,
    max_message_size: usize,
    connection_id: uuid::Uuid,
    observer: Option<Arc<dyn FrameObserver>>,
}

/// A length-prefixed framer over a single split duplex stream.
pub struct Framer<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Framer<S> {
    fn clone(&self) -> Self {
        Framer { inner: self.inner.clone() }
    }
}

impl<S> Framer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, connection_id: uuid::Uuid) -> Self {
        Self::with_options(stream, connection_id, DEFAULT_MAX_MESSAGE_SIZE, None)
    }

    pub fn with_options(
        stream: S,
        connection_id: uuid::Uuid,
        max_message_size: usize,
        observer: Option<Arc<dyn FrameObserver>>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Framer {
            inner: Arc::new(Inner {
                reader: AsyncMutex::new(reader),
                writer: AsyncMutex::new(writer),
                max_message_size,
                connection_id,
                observer,
            }),
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.inner.max_message_size
    }

    pub fn connection_id(&self) -> uuid::Uuid {
        self.inner.connection_id
    }

    /// Write one frame: a 4-byte big-endian length prefix followed by
    /// `payload`. Concurrent callers serialize through the writer mutex so
    /// the prefix and payload of one call are never interleaved with
    /// another's.
    pub async fn write_frame(&self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.is_empty() {
            return Err(FrameError::EmptyFrame);
        }
        if payload.len() > self.inner.max_message_size {
            return Err(FrameError::MessageTooLarge {
                len: payload.len(),
                max: self.inner.max_message_size,
            });
        }
        let len = u32::try_from(payload.len()).expect("checked against max_message_size above");

        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        drop(writer);

        if let Some(observer) = &self.inner.observer {
            let sample_len = payload.len().min(4096);
            observer.on_frame(FrameEvent {
                direction: Direction::Write,
                connection_id: self.inner.connection_id,
                frame_size: LENGTH_PREFIX_SIZE + payload.len(),
                sample: &payload[..sample_len],
                truncated: false,
            });
        }
        Ok(())
    }

    /// Read one frame's payload. EOF before any prefix byte is [`FrameError::Eof`];
    /// EOF mid-prefix or mid-payload is [`FrameError::Truncated`].
    pub async fn read_frame(&self) -> Result<Vec<u8>, FrameError> {
        let mut reader = self.inner.reader.lock().await;

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let mut read_so_far = 0usize;
        while read_so_far < LENGTH_PREFIX_SIZE {
            let n = reader.read(&mut prefix[read_so_far..]).await?;
            if n == 0 {
                return Err(if read_so_far == 0 { FrameError::Eof } else { FrameError::Truncated });
            }
            read_so_far += n;
        }
        let len = u32::from_be_bytes(prefix) as usize;

        if len == 0 {
            return Err(FrameError::EmptyFrame);
        }
        if len > self.inner.max_message_size {
            return Err(FrameError::MessageTooLarge { len, max: self.inner.max_message_size });
        }

        let mut payload = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                if let Some(observer) = &self.inner.observer {
                    observer.on_frame(FrameEvent {
                        direction: Direction::Read,
                        connection_id: self.inner.connection_id,
                        frame_size: LENGTH_PREFIX_SIZE + len,
                        sample: &[],
                        truncated: true,
                    });
                }
                return Err(FrameError::Truncated);
            }
            return Err(e.into());
        }
        drop(reader);

        if let Some(observer) = &self.inner.observer {
            let sample_len = payload.len().min(4096);
            observer.on_frame(FrameEvent {
                direction: Direction::Read,
                connection_id: self.inner.connection_id,
                frame_size: LENGTH_PREFIX_SIZE + len,
                sample: &payload[..sample_len],
                truncated: false,
            });
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (a, b) = tokio::io::duplex(4096);
        let writer = Framer::new(a, uuid::Uuid::new_v4());
        let reader = Framer::new(b, uuid::Uuid::new_v4());

        writer.write_frame(b"hello").await.unwrap();
        let got = reader.read_frame().await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn rejects_empty_frame_on_write() {
        let (a, _b) = tokio::io::duplex(4096);
        let writer = Framer::new(a, uuid::Uuid::new_v4());
        assert!(matches!(writer.write_frame(b"").await, Err(FrameError::EmptyFrame)));
    }

    #[tokio::test]
    async fn rejects_oversized_frame_on_write() {
        let (a, _b) = tokio::io::duplex(8);
        let writer = Framer::with_options(a, uuid::Uuid::new_v4(), 4, None);
        let big = vec![0u8; 16];
        assert!(matches!(
            writer.write_frame(&big).await,
            Err(FrameError::MessageTooLarge { len: 16, max: 4 })
        ));
    }

    #[tokio::test]
    async fn clean_eof_before_any_frame() {
        let (a, b) = tokio::io::duplex(4096);
        drop(a);
        let reader = Framer::new(b, uuid::Uuid::new_v4());
        assert!(matches!(reader.read_frame().await, Err(FrameError::Eof)));
    }

    #[tokio::test]
    async fn truncated_mid_payload() {
        let (mut a, b) = tokio::io::duplex(4096);
        let reader = Framer::new(b, uuid::Uuid::new_v4());
        // Declare a 10-byte payload but only send 3, then close.
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        assert!(matches!(reader.read_frame().await, Err(FrameError::Truncated)));
    }
}
