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
use super::record::{starts_with_ccs, CCS_RECORD};

/// Synthetic CCS messages sent per probe at most
pub const MAX_CCS_ATTEMPTS: usize = 35;

/// Subtracted from the index of the failing attempt to get the last count
/// the destination accepted silently. Empirically tuned: attempt 32 is the
/// last silent one, 33 triggers an alert, 34 a reset, 35 a local write error.
pub const CCS_COUNT_OFFSET: i32 = 2;

enum ProberState {
    /// Waiting for the client's first CCS record
    Watching,
    Injecting {
        attempt: usize,
        written: usize,
        pause: Option<Pin<Box<Sleep>>>,
    },
    /// Count recorded, writes pass through
    Forwarding,
}

/// Transport wrapper that measures how many duplicate CCS messages a
/// destination tolerates.
///
/// The first outgoing CCS record is held back while up to
/// [`MAX_CCS_ATTEMPTS`] copies of a synthetic CCS are written, each followed
/// by a pause of twice the measured connect round trip. The index of the
/// first failed write minus [`CCS_COUNT_OFFSET`] is stored as the count,
/// then the held record is forwarded and the handshake continues.
pub struct CcsProber<T> {
    inner: T,
    key: ProbeKey,
    cache: Arc<ProbeCache>,
    spacing: Duration,
    state: ProberState,
}

impl<T> CcsProber<T> {
    pub fn new(inner: T, key: ProbeKey, cache: Arc<ProbeCache>, rtt: Duration) -> Self {
        Self { inner, key, cache, spacing: rtt.saturating_mul(2), state: ProberState::Watching }
    }

    /// Worst-case time spent injecting
    pub fn injection_budget(&self) -> Duration {
        self.spacing.saturating_mul(MAX_CCS_ATTEMPTS as u32)
    }

    /// True once the count has been stored
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ProberState::Forwarding)
    }

    fn finish(&mut self, failed_at: usize) {
        let count = failed_at as i32 - CCS_COUNT_OFFSET;
        debug!(key = %self.key, attempts = failed_at, count, "duplicate CCS tolerance measured");
        self.cache.store_max_ccs_count(&self.key, count);
        self.state = ProberState::Forwarding;
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for CcsProber<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for CcsProber<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = &mut *self;
        loop {
            match &mut this.state {
                ProberState::Watching => {
                    if !starts_with_ccs(data) {
                        return Pin::new(&mut this.inner).poll_write(cx, data);
                    }
                    debug!(
                        key = %this.key,
                        spacing = ?this.spacing,
                        "client CCS held, injecting duplicates"
                    );
                    this.state = ProberState::Injecting { attempt: 0, written: 0, pause: None };
                }
                ProberState::Injecting { attempt, written, pause } => {
                    if let Some(p) = pause {
                        ready!(p.as_mut().poll(cx));
                        *pause = None;
                        *written = 0;
                        if *attempt + 1 == MAX_CCS_ATTEMPTS {
                            let last = *attempt;
                            this.finish(last);
                            continue;
                        }
                        *attempt += 1;
                    }
                    match Pin::new(&mut this.inner).poll_write(cx, &CCS_RECORD[*written..]) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Ok(0)) => {
                            let failed_at = *attempt;
                            this.finish(failed_at);
                        }
                        Poll::Ready(Err(e)) => {
                            let failed_at = *attempt;
                            debug!(
                                key = %this.key,
                                attempt = failed_at,
                                error = %e,
                                "synthetic CCS write failed"
                            );
                            this.finish(failed_at);
                        }
                        Poll::Ready(Ok(n)) => {
                            *written += n;
                            if *written == CCS_RECORD.len() {
                                *pause = Some(Box::pin(sleep(this.spacing)));
                            }
                        }
                    }
                }
                ProberState::Forwarding => return Pin::new(&mut this.inner).poll_write(cx, data),
            }
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::AlpnProfile;
    use std::io;
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::time::Instant;

    type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

    /// Accepts `accept` writes, then fails every write with a reset
    #[derive(Clone)]
    struct ScriptedTransport {
        accept: usize,
        writes: Arc<Mutex<Vec<(Instant, Vec<u8>)>>>,
    }

    impl ScriptedTransport {
        fn new(accept: usize) -> Self {
            Self { accept, writes: Arc::new(Mutex::new(Vec::new())) }
        }

        fn writes(&self) -> Vec<(Instant, Vec<u8>)> {
            self.writes.lock().map(|w| w.clone()).unwrap_or_default()
        }
    }

    impl AsyncRead for ScriptedTransport {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for ScriptedTransport {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            data: &[u8],
        ) -> Poll<io::Result<usize>> {
            let Ok(mut writes) = self.writes.lock() else {
                return Poll::Ready(Err(io::Error::other("poisoned")));
            };
            if writes.len() >= self.accept {
                return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
            }
            writes.push((Instant::now(), data.to_vec()));
            Poll::Ready(Ok(data.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn key() -> ProbeKey {
        ProbeKey::new("127.0.0.1:443", "localhost", AlpnProfile::H2Http11)
    }

    #[tokio::test(start_paused = true)]
    async fn alert_on_tenth_write_records_eight() -> TestResult<()> {
        let cache = Arc::new(ProbeCache::new());
        cache.try_claim(&key());
        // ten synthetic writes land, the eleventh fails after the alert
        let transport = ScriptedTransport::new(10);
        let mut prober =
            CcsProber::new(transport.clone(), key(), cache.clone(), Duration::from_millis(20));

        let result = prober.write_all(&CCS_RECORD).await;
        assert!(result.is_err());
        assert!(prober.is_finished());
        assert_eq!(cache.max_ccs_count(&key()), Some(8));
        assert_eq!(transport.writes().len(), 10);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn tolerant_destination_caps_at_budget() -> TestResult<()> {
        let cache = Arc::new(ProbeCache::new());
        let transport = ScriptedTransport::new(usize::MAX);
        let mut prober =
            CcsProber::new(transport.clone(), key(), cache.clone(), Duration::from_millis(5));

        let mut flight = CCS_RECORD.to_vec();
        flight.extend_from_slice(&[23, 3, 3, 0, 1, 9]);
        prober.write_all(&flight).await?;

        let writes = transport.writes();
        assert_eq!(writes.len(), MAX_CCS_ATTEMPTS + 1);
        assert!(writes[..MAX_CCS_ATTEMPTS].iter().all(|(_, w)| w == &CCS_RECORD));
        // the held flight goes out last, untouched
        assert_eq!(writes[MAX_CCS_ATTEMPTS].1, flight);
        assert_eq!(cache.max_ccs_count(&key()), Some(32));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_failure_records_minus_two() -> TestResult<()> {
        let cache = Arc::new(ProbeCache::new());
        let mut prober = CcsProber::new(
            ScriptedTransport::new(0),
            key(),
            cache.clone(),
            Duration::from_millis(5),
        );

        assert!(prober.write_all(&CCS_RECORD).await.is_err());
        assert_eq!(cache.max_ccs_count(&key()), Some(-2));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_writes_are_spaced_by_twice_the_rtt() -> TestResult<()> {
        let rtt = Duration::from_millis(40);
        let cache = Arc::new(ProbeCache::new());
        let transport = ScriptedTransport::new(6);
        let mut prober = CcsProber::new(transport.clone(), key(), cache, rtt);

        let _ = prober.write_all(&CCS_RECORD).await;

        let writes = transport.writes();
        assert_eq!(writes.len(), 6);
        for pair in writes.windows(2) {
            assert!(pair[1].0.duration_since(pair[0].0) >= rtt * 2);
        }
        Ok(())
    }

    #[tokio::test]
    async fn non_ccs_writes_pass_through_untouched() -> TestResult<()> {
        let cache = Arc::new(ProbeCache::new());
        let transport = ScriptedTransport::new(usize::MAX);
        let mut prober = CcsProber::new(transport.clone(), key(), cache.clone(), Duration::ZERO);

        prober.write_all(&[22, 3, 1, 0, 2, 1, 0]).await?;

        assert_eq!(transport.writes().len(), 1);
        assert!(!prober.is_finished());
        assert_eq!(cache.max_ccs_count(&key()), None);
        Ok(())
    }
}
