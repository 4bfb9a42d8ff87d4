use std::future::Future;
use std::sync::Arc;

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::chrome::ChromeEngine;
use super::fingerprint::ClientFingerprint;
use crate::config::TlsConfig;
use crate::error::{ProbeError, Result};
use crate::probe::AlpnProfile;

/// Byte stream returned by a completed handshake
pub trait ProbeIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProbeIo for T {}

/// TLS client able to run a handshake over an arbitrary transport with the
/// fingerprint and ALPN list of a probe profile.
pub trait TlsEngine: Send + Sync + 'static {
    fn handshake<S>(
        &self,
        io: S,
        server_name: &str,
        profile: AlpnProfile,
    ) -> impl Future<Output = Result<Box<dyn ProbeIo>>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static;
}

/// rustls-backed engine with one client config per ALPN profile, all with
/// rustls' own ClientHello
#[derive(Clone)]
pub struct RustlsEngine {
    configs: [Arc<ClientConfig>; 3],
}

impl RustlsEngine {
    pub fn new(roots: RootCertStore) -> Result<Self> {
        let [none, http11, h2] = AlpnProfile::ALL;
        Ok(Self {
            configs: [
                Arc::new(build_client_config(&roots, none)?),
                Arc::new(build_client_config(&roots, http11)?),
                Arc::new(build_client_config(&roots, h2)?),
            ],
        })
    }

    pub fn with_webpki_roots() -> Result<Self> {
        Self::new(webpki_root_store())
    }

    /// webpki roots plus the PEM certificates from `ca_path`, if configured
    pub fn from_config(tls: &TlsConfig) -> Result<Self> {
        let mut roots = webpki_root_store();
        if let Some(ca_path) = &tls.ca_path {
            let added = add_pem_roots(&mut roots, ca_path)?;
            debug!(ca_path, added, "extra trust anchors loaded");
        }
        Self::new(roots)
    }

    pub fn client_config(&self, profile: AlpnProfile) -> Arc<ClientConfig> {
        match profile {
            AlpnProfile::None => self.configs[0].clone(),
            AlpnProfile::Http11 => self.configs[1].clone(),
            AlpnProfile::H2Http11 => self.configs[2].clone(),
        }
    }
}

impl TlsEngine for RustlsEngine {
    fn handshake<S>(
        &self,
        io: S,
        server_name: &str,
        profile: AlpnProfile,
    ) -> impl Future<Output = Result<Box<dyn ProbeIo>>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connector = TlsConnector::from(self.client_config(profile));
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| ProbeError::InvalidServerName(format!("{server_name}: {e}")));
        async move {
            let tls = connector
                .connect(name?, io)
                .await
                .map_err(|e| ProbeError::Handshake(e.to_string()))?;
            Ok(Box::new(tls) as Box<dyn ProbeIo>)
        }
    }
}

/// Routes each ALPN profile to the stack that produces its fingerprint:
/// rustls for [`ClientFingerprint::Generic`], BoringSSL for
/// [`ClientFingerprint::Chrome`].
#[derive(Clone)]
pub struct ProfileEngine {
    generic: RustlsEngine,
    chrome: ChromeEngine,
}

impl ProfileEngine {
    pub fn new(generic: RustlsEngine, chrome: ChromeEngine) -> Self {
        Self { generic, chrome }
    }

    pub fn from_config(tls: &TlsConfig) -> Result<Self> {
        Ok(Self::new(RustlsEngine::from_config(tls)?, ChromeEngine::new(tls.ca_path.as_deref())?))
    }
}

impl TlsEngine for ProfileEngine {
    fn handshake<S>(
        &self,
        io: S,
        server_name: &str,
        profile: AlpnProfile,
    ) -> impl Future<Output = Result<Box<dyn ProbeIo>>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        async move {
            match profile.fingerprint() {
                ClientFingerprint::Generic => {
                    self.generic.handshake(io, server_name, profile).await
                }
                ClientFingerprint::Chrome => self.chrome.handshake(io, server_name, profile).await,
            }
        }
    }
}

fn build_client_config(roots: &RootCertStore, profile: AlpnProfile) -> Result<ClientConfig> {
    let mut cfg = ClientConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(format!("failed to build tls config: {e}")))?
        .with_root_certificates(roots.clone())
        .with_no_client_auth();
    cfg.alpn_protocols = profile.alpn_protocols();
    Ok(cfg)
}

fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

fn add_pem_roots(roots: &mut RootCertStore, path: &str) -> Result<usize> {
    let buf = std::fs::read(path)
        .map_err(|e| ProbeError::Tls(format!("failed to open CA file: {e}")))?;
    let mut added = 0;
    for cert in CertificateDer::pem_slice_iter(&buf) {
        let cert = cert.map_err(|e| ProbeError::Tls(format!("failed to parse CA file: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| ProbeError::Tls(format!("invalid trust anchor: {e}")))?;
        added += 1;
    }
    if added == 0 {
        return Err(ProbeError::Tls(format!("no certificates found in {path}")));
    }
    Ok(added)
}
