use std::future::Future;

use boring::ssl::{SslConnector, SslMethod};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::engine::{ProbeIo, TlsEngine};
use super::fingerprint::{alpn_wire, apply_chrome_fingerprint};
use crate::error::{ProbeError, Result};
use crate::probe::AlpnProfile;

/// BoringSSL engine sending a Chrome ClientHello
///
/// Trust anchors are the system store plus `ca_path`, if given. The ALPN
/// list is set per connection from the probe profile.
#[derive(Clone)]
pub struct ChromeEngine {
    connector: SslConnector,
}

impl ChromeEngine {
    pub fn new(ca_path: Option<&str>) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| ProbeError::Tls(format!("failed to create connector: {e}")))?;
        apply_chrome_fingerprint(&mut builder)?;
        if let Some(ca_path) = ca_path {
            builder
                .set_ca_file(ca_path)
                .map_err(|e| ProbeError::Tls(format!("failed to load CA file {ca_path}: {e}")))?;
            debug!(ca_path, "extra trust anchors loaded for the Chrome engine");
        }
        Ok(Self { connector: builder.build() })
    }
}

impl TlsEngine for ChromeEngine {
    fn handshake<S>(
        &self,
        io: S,
        server_name: &str,
        profile: AlpnProfile,
    ) -> impl Future<Output = Result<Box<dyn ProbeIo>>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let configured = self.connector.configure().and_then(|mut config| {
            let protocols = profile.alpn_protocols();
            if !protocols.is_empty() {
                config.set_alpn_protos(&alpn_wire(&protocols))?;
            }
            Ok(config)
        });
        let server_name = server_name.to_owned();
        async move {
            let config = configured.map_err(|e| ProbeError::Tls(e.to_string()))?;
            let tls = tokio_boring::connect(config, &server_name, io)
                .await
                .map_err(|e| ProbeError::Handshake(e.to_string()))?;
            Ok(Box::new(tls) as Box<dyn ProbeIo>)
        }
    }
}
