//! Scoped item handles returned by store backends.

use crate::Result;
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, warn};

/// Readable stream over an item's contents.
///
/// The underlying transfer is released when the reader is dropped.
pub type ItemReader = Pin<Box<dyn AsyncRead + Send>>;

/// Wrap `reader` so any failure while streaming reports the item as missing.
///
/// Errors come back as [`io::ErrorKind::NotFound`] naming `location`.
pub fn miss_on_error(location: impl Into<String>, reader: ItemReader) -> ItemReader {
    Box::pin(MissOnError {
        inner: reader,
        location: location.into(),
    })
}

struct MissOnError {
    inner: ItemReader,
    location: String,
}

impl AsyncRead for MissOnError {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_read(cx, buf) {
            Poll::Ready(Err(e)) => {
                debug!(location = %this.location, error = %e, "Item transfer failed");
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{}: {}", this.location, e),
                )))
            }
            other => other,
        }
    }
}

/// Destination that receives an item's bytes once its writer is finished.
#[async_trait]
pub trait ItemSink: Send {
    /// Store `bytes` as the complete contents of the item.
    async fn commit(self: Box<Self>, bytes: Vec<u8>) -> Result<()>;

    /// Location the sink writes to, for logging.
    fn location(&self) -> &str;
}

/// Writable sink for a single item.
///
/// Bytes accumulate in memory and are handed to the sink as one object by
/// [`ItemWriter::finish`]. A writer dropped before `finish` stores nothing.
pub struct ItemWriter {
    buffer: Vec<u8>,
    sink: Option<Box<dyn ItemSink>>,
}

impl ItemWriter {
    pub fn new(sink: Box<dyn ItemSink>) -> Self {
        Self {
            buffer: Vec::new(),
            sink: Some(sink),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Upload the accumulated bytes, replacing any existing item.
    pub async fn finish(mut self) -> Result<()> {
        let bytes = std::mem::take(&mut self.buffer);
        match self.sink.take() {
            Some(sink) => sink.commit(bytes).await,
            None => Ok(()),
        }
    }
}

impl io::Write for ItemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncWrite for ItemWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Drop for ItemWriter {
    fn drop(&mut self) {
        if let Some(sink) = &self.sink {
            warn!(
                location = %sink.location(),
                pending_bytes = self.buffer.len(),
                "Item writer dropped without finish, nothing was stored"
            );
        }
    }
}
