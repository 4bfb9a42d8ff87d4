use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Sleep};
use tracing::debug;

use super::cache::ProbeCache;
use super::key::ProbeKey;
use super::record::{record_lengths, starts_with_ccs, CCS_RECORD};

/// How long post-handshake bytes are collected
pub const CAPTURE_WINDOW: Duration = Duration::from_secs(5);

/// Upper bound on captured bytes; the window normally ends first
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

enum ObserverState {
    /// Handshake in progress, reads and writes pass through
    AwaitingCcs,
    /// A standalone CCS record went out; the rest of the client flight follows
    CcsSent,
    /// Client flight complete, the next read captures
    Armed,
    Capturing(Box<Capture>),
    /// Capture stored, every read reports EOF
    Done,
}

struct Capture {
    deadline: Pin<Box<Sleep>>,
    data: Vec<u8>,
}

impl Capture {
    fn new(window: Duration) -> Self {
        Self { deadline: Box::pin(sleep(window)), data: Vec::new() }
    }

    /// Reads until EOF, error, the size cap or the deadline
    fn poll_fill<T: AsyncRead>(
        &mut self,
        mut inner: Pin<&mut T>,
        cx: &mut Context<'_>,
    ) -> Poll<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if self.deadline.as_mut().poll(cx).is_ready() || self.data.len() >= MAX_CAPTURE_BYTES {
                return Poll::Ready(());
            }
            let mut read_buf = ReadBuf::new(&mut chunk);
            match inner.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => {
                    let filled = read_buf.filled();
                    if filled.is_empty() {
                        return Poll::Ready(());
                    }
                    self.data.extend_from_slice(filled);
                }
                Poll::Ready(Err(e)) => {
                    debug!(error = %e, captured = self.data.len(), "capture read failed");
                    return Poll::Ready(());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Transport wrapper that records the lengths of the records a destination
/// sends right after the TLS handshake.
///
/// Once the client's CCS flight has been written, the first read stops
/// feeding the TLS engine: it collects raw bytes for the capture window,
/// stores the parsed record lengths under the probe key and reports EOF.
pub struct PostHandshakeObserver<T> {
    inner: T,
    key: ProbeKey,
    cache: Arc<ProbeCache>,
    window: Duration,
    state: ObserverState,
}

impl<T> PostHandshakeObserver<T> {
    pub fn new(inner: T, key: ProbeKey, cache: Arc<ProbeCache>) -> Self {
        Self { inner, key, cache, window: CAPTURE_WINDOW, state: ObserverState::AwaitingCcs }
    }

    pub fn with_capture_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// True once the capture has been stored
    pub fn is_done(&self) -> bool {
        matches!(self.state, ObserverState::Done)
    }

    fn observe_write(&mut self, buf: &[u8], written: usize) {
        match self.state {
            ObserverState::AwaitingCcs if starts_with_ccs(buf) => {
                self.state = if written > CCS_RECORD.len() {
                    ObserverState::Armed
                } else {
                    ObserverState::CcsSent
                };
            }
            ObserverState::CcsSent => self.state = ObserverState::Armed,
            _ => {}
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for PostHandshakeObserver<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        loop {
            match &mut this.state {
                ObserverState::AwaitingCcs | ObserverState::CcsSent => {
                    return Pin::new(&mut this.inner).poll_read(cx, buf);
                }
                ObserverState::Armed => {
                    debug!(key = %this.key, "client flight sent, capturing post-handshake records");
                    this.state = ObserverState::Capturing(Box::new(Capture::new(this.window)));
                }
                ObserverState::Capturing(capture) => {
                    ready!(capture.poll_fill(Pin::new(&mut this.inner), cx));
                    let lens = record_lengths(&capture.data);
                    debug!(
                        key = %this.key,
                        captured = capture.data.len(),
                        ?lens,
                        "post-handshake records measured"
                    );
                    this.cache.resolve_record_lens(&this.key, lens);
                    this.state = ObserverState::Done;
                }
                ObserverState::Done => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for PostHandshakeObserver<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let written = ready!(Pin::new(&mut self.inner).poll_write(cx, data))?;
        self.observe_write(data, written);
        Poll::Ready(Ok(written))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
