//! Request and response bodies.
//!
//! Everything that moves file data is streamed. The archive codec is
//! blocking `std::io`, so this module bridges it to hyper's async bodies with
//! bounded channels:
//!
//! ```text
//! download:  pack() ─► ChannelWriter ─► mpsc ─► ChannelBody ─► hyper
//! upload:    hyper ─► reader() ─► mpsc ─► ChannelReader ─► unpack()
//! ```
//!
//! The channel capacity bounds how far the producer can run ahead of the
//! consumer, so memory stays flat regardless of archive size.

use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use tokio::sync::mpsc;

/// Boxed error carried by [`Body`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The body type used for both requests and responses.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// Number of in-flight chunks between a blocking producer and its consumer.
const CHANNEL_DEPTH: usize = 16;

/// Chunk size used when writing into a [`ChannelWriter`].
const CHUNK: usize = 32 * 1024;

pub fn empty() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into()).map_err(|never| match never {}).boxed_unsync()
}

/// Boxes any `Bytes` body, e.g. hyper's `Incoming`.
pub fn boxed<B>(body: B) -> Body
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A streaming response body fed by a [`ChannelWriter`] on a blocking
/// thread.
pub fn channel() -> (ChannelWriter, Body) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let writer = ChannelWriter { tx, buf: Vec::with_capacity(CHUNK) };
    (writer, ChannelBody { rx }.boxed_unsync())
}

// ── Response side ─────────────────────────────────────────────────────────────

struct ChannelBody {
    rx: mpsc::Receiver<Result<Bytes, io::Error>>,
}

impl HttpBody for ChannelBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|res| res.map(Frame::data).map_err(Into::into)))
    }
}

/// Blocking [`Write`] half of a streaming response body.
///
/// Writes are coalesced into `CHUNK`-sized frames. Dropping the writer ends
/// the body; [`ChannelWriter::abort`] ends it with an error so the peer sees
/// a truncated transfer instead of a clean one.
pub struct ChannelWriter {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    /// Terminates the body with `error`.
    pub fn abort(mut self, error: io::Error) {
        self.buf.clear();
        let _ = self.tx.blocking_send(Err(error));
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK)));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = CHUNK - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == CHUNK {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        let _ = self.send_buffered();
    }
}

// ── Request side ──────────────────────────────────────────────────────────────

/// Blocking [`Read`] half of a streamed request body.
///
/// Must only be read from a blocking thread (`spawn_blocking`).
pub struct ChannelReader {
    rx: mpsc::Receiver<Result<Bytes, io::Error>>,
    current: Bytes,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while !self.current.has_remaining() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

/// Starts forwarding `body` into a [`ChannelReader`].
///
/// The forwarding task stops early when the reader is dropped, so a failed
/// extraction does not keep pulling the rest of the upload.
pub fn reader(mut body: Body) -> ChannelReader {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    tokio::spawn(async move {
        while let Some(frame) = body.frame().await {
            let item = match frame {
                Ok(frame) => match frame.into_data() {
                    Ok(data) if data.is_empty() => continue,
                    Ok(data) => Ok(data),
                    // Trailers carry nothing the codec needs.
                    Err(_) => continue,
                },
                Err(e) => Err(io::Error::other(e)),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });
    ChannelReader { rx, current: Bytes::new() }
}

/// Wraps a body and runs `on_end` exactly once with the number of data bytes
/// that went through it, when the body finishes or is dropped.
pub(crate) struct Observed<F: FnOnce(u64)> {
    inner: Body,
    bytes: u64,
    on_end: Option<F>,
}

impl<F: FnOnce(u64)> Observed<F> {
    pub(crate) fn new(inner: Body, on_end: F) -> Self {
        Self { inner, bytes: 0, on_end: Some(on_end) }
    }

    fn finish(&mut self) {
        if let Some(on_end) = self.on_end.take() {
            on_end(self.bytes);
        }
    }
}

impl<F: FnOnce(u64) + Unpin> HttpBody for Observed<F> {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    self.bytes += data.len() as u64;
                }
            }
            Poll::Ready(None) => self.finish(),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<F: FnOnce(u64)> Drop for Observed<F> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Keeps `guard` alive for as long as the wrapped body is being sent.
pub(crate) struct Guarded<G> {
    inner: Body,
    _guard: G,
}

impl<G> Guarded<G> {
    pub(crate) fn new(inner: Body, guard: G) -> Self {
        Self { inner, _guard: guard }
    }
}

impl<G: Unpin> HttpBody for Guarded<G> {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_channel_body_streams_everything_written() {
        let (mut writer, body) = channel();
        let producer = tokio::task::spawn_blocking(move || {
            for _ in 0..10 {
                writer.write_all(&[b'x'; 10_000]).unwrap();
            }
        });

        let collected = body.collect().await.unwrap().to_bytes();
        producer.await.unwrap();
        assert_eq!(collected.len(), 100_000);
    }

    #[tokio::test]
    async fn test_aborted_channel_body_errors() {
        let (mut writer, body) = channel();
        tokio::task::spawn_blocking(move || {
            writer.write_all(b"partial").unwrap();
            writer.flush().unwrap();
            writer.abort(io::Error::other("boom"));
        });

        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_reader_yields_request_bytes() {
        let mut reader = reader(full(vec![3u8; 200_000]));
        let read = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            out
        })
        .await
        .unwrap();
        assert_eq!(read.len(), 200_000);
    }

    #[tokio::test]
    async fn test_observed_reports_once_on_end() {
        let seen = Arc::new(AtomicU64::new(u64::MAX));
        let probe = Arc::clone(&seen);
        let body = Observed::new(full("hello"), move |n| probe.store(n, Ordering::SeqCst));

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello");
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_observed_reports_on_drop() {
        let seen = Arc::new(AtomicU64::new(u64::MAX));
        let probe = Arc::clone(&seen);
        drop(Observed::new(full("unsent"), move |n| probe.store(n, Ordering::SeqCst)));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
