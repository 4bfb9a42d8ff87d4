use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::cache::ProbeCache;
use super::ccs::CcsProber;
use super::key::{AlpnProfile, ProbeKey};
use super::observer::{PostHandshakeObserver, CAPTURE_WINDOW};
use super::proxy_protocol::encode_header;
use crate::config::{Destination, ProxyVersion, TimeoutConfig};
use crate::error::{ProbeError, Result};
use crate::tls::TlsEngine;

/// Time limits applied around each probe
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub connect_timeout: Duration,
    /// Handshake limit before the capture window or injection budget is added
    pub handshake_timeout: Duration,
    pub capture_window: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for ProbeSettings {
    fn from(timeouts: &TimeoutConfig) -> Self {
        Self {
            connect_timeout: timeouts.connect(),
            handshake_timeout: timeouts.tls_handshake(),
            capture_window: CAPTURE_WINDOW,
        }
    }
}

/// Resolves a pending record-length entry to an empty sequence when the
/// capture task ends without storing one
struct PendingRecordLensGuard {
    cache: Arc<ProbeCache>,
    key: ProbeKey,
}

impl Drop for PendingRecordLensGuard {
    fn drop(&mut self) {
        if self.cache.settle_pending(&self.key) {
            debug!(key = %self.key, "capture did not complete, stored empty record lengths");
        }
    }
}

/// Schedules both measurements for every key of a destination, at most once
/// per key for the lifetime of the cache.
pub struct Prober<E> {
    engine: Arc<E>,
    cache: Arc<ProbeCache>,
    settings: ProbeSettings,
    tracker: TaskTracker,
}

impl<E> Clone for Prober<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            cache: self.cache.clone(),
            settings: self.settings.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<E: TlsEngine> Prober<E> {
    pub fn new(engine: E, cache: Arc<ProbeCache>, settings: ProbeSettings) -> Self {
        Self { engine: Arc::new(engine), cache, settings, tracker: TaskTracker::new() }
    }

    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    /// Number of probe tasks still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Claims every (server name, ALPN profile) key of `destination` and
    /// spawns the two measurements for each newly claimed key. Keys claimed
    /// earlier are skipped, so repeated calls are harmless.
    pub fn detect(&self, destination: &Destination) {
        let mut claimed = 0usize;
        for server_name in &destination.server_names {
            for alpn in AlpnProfile::ALL {
                let key = ProbeKey::new(destination.dest.as_str(), server_name.as_str(), alpn);
                if !self.cache.try_claim(&key) {
                    continue;
                }
                claimed += 1;
                self.spawn_record_lens(key.clone(), destination.xver);
                self.spawn_ccs_tolerance(key, destination.xver);
            }
        }
        if claimed > 0 {
            info!(dest = %destination.dest, keys = claimed, "probing destination");
        }
    }

    /// Waits until every spawned probe task has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn spawn_record_lens(&self, key: ProbeKey, xver: ProxyVersion) {
        let prober = self.clone();
        self.tracker.spawn(async move {
            let _settle =
                PendingRecordLensGuard { cache: prober.cache.clone(), key: key.clone() };
            if let Err(e) = prober.measure_record_lens(&key, xver).await {
                debug!(%key, error = %e, "post-handshake record probe failed");
            }
        });
    }

    fn spawn_ccs_tolerance(&self, key: ProbeKey, xver: ProxyVersion) {
        let prober = self.clone();
        self.tracker.spawn(async move {
            if let Err(e) = prober.measure_ccs_tolerance(&key, xver).await {
                debug!(%key, error = %e, "duplicate CCS probe failed");
            }
        });
    }

    /// Runs a handshake through [`PostHandshakeObserver`] and lets it capture
    /// the records the destination sends afterwards
    pub async fn measure_record_lens(&self, key: &ProbeKey, xver: ProxyVersion) -> Result<()> {
        let (stream, _rtt) = self.dial(&key.dest, xver).await?;
        self.record_lens_over(key, stream).await
    }

    /// Record-length measurement over an already connected transport
    pub async fn record_lens_over<S>(&self, key: &ProbeKey, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let observer = PostHandshakeObserver::new(stream, key.clone(), self.cache.clone())
            .with_capture_window(self.settings.capture_window);

        let limit = self.settings.handshake_timeout + self.settings.capture_window;
        let mut tls = timeout(limit, self.engine.handshake(observer, &key.server_name, key.alpn))
            .await
            .map_err(|_| ProbeError::Timeout("TLS handshake"))??;

        // the capture runs inside the first read after the client flight
        match timeout(limit, tokio::io::copy(&mut tls, &mut tokio::io::sink())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(%key, error = %e, "drain ended with error"),
            Err(_) => debug!(%key, "drain timed out"),
        }
        Ok(())
    }

    /// Runs a handshake through [`CcsProber`], spacing the synthetic CCS
    /// messages by twice the measured connect time
    pub async fn measure_ccs_tolerance(&self, key: &ProbeKey, xver: ProxyVersion) -> Result<()> {
        let (stream, rtt) = self.dial(&key.dest, xver).await?;
        self.ccs_tolerance_over(key, stream, rtt).await
    }

    /// Duplicate-CCS measurement over an already connected transport whose
    /// connect took `rtt`
    pub async fn ccs_tolerance_over<S>(
        &self,
        key: &ProbeKey,
        stream: S,
        rtt: Duration,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let prober = CcsProber::new(stream, key.clone(), self.cache.clone(), rtt);

        let limit = self.settings.handshake_timeout + prober.injection_budget();
        timeout(limit, self.engine.handshake(prober, &key.server_name, key.alpn))
            .await
            .map_err(|_| ProbeError::Timeout("TLS handshake"))??;
        Ok(())
    }

    /// Connects, measuring the time taken, and writes the PROXY header if any
    async fn dial(&self, dest: &str, xver: ProxyVersion) -> Result<(TcpStream, Duration)> {
        let started = Instant::now();
        let mut stream = timeout(self.settings.connect_timeout, TcpStream::connect(dest))
            .await
            .map_err(|_| ProbeError::Timeout("connect"))?
            .map_err(|source| ProbeError::Connect { dest: dest.to_string(), source })?;
        let rtt = started.elapsed();

        if let Some(header) = encode_header(xver, stream.local_addr()?, stream.peer_addr()?) {
            stream.write_all(&header).await?;
        }
        Ok((stream, rtt))
    }
}
