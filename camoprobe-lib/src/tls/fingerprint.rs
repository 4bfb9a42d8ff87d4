use boring::ssl::{SslConnectorBuilder, SslVersion};

use crate::error::{ProbeError, Result};

/// ClientHello shape used for a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientFingerprint {
    /// rustls' own ClientHello
    Generic,
    /// Current Chrome: GREASE, permuted extensions, Chrome suite, group and
    /// signature algorithm order, OCSP and SCT requests
    Chrome,
}

/// TLS 1.2 suites in Chrome order. BoringSSL's fixed TLS 1.3 order
/// (AES-128-GCM, AES-256-GCM, ChaCha20) already matches Chrome.
const CHROME_CIPHERS: &str = "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:\
ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:\
ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305:\
ECDHE-RSA-AES128-SHA:ECDHE-RSA-AES256-SHA:\
AES128-GCM-SHA256:AES256-GCM-SHA384:AES128-SHA:AES256-SHA";

const CHROME_CURVES: &str = "X25519:P-256:P-384";

const CHROME_SIGALGS: &str = "ECDSA+SHA256:RSA-PSS+SHA256:RSA+SHA256:\
ECDSA+SHA384:RSA-PSS+SHA384:RSA+SHA384:\
RSA-PSS+SHA512:RSA+SHA512";

/// Shapes every ClientHello built from `builder` like Chrome's
pub fn apply_chrome_fingerprint(builder: &mut SslConnectorBuilder) -> Result<()> {
    builder.set_grease_enabled(true);
    builder.set_permute_extensions(true);
    builder.enable_ocsp_stapling();
    builder.enable_signed_cert_timestamps();
    builder.set_min_proto_version(Some(SslVersion::TLS1_2)).map_err(fingerprint_error)?;
    builder.set_max_proto_version(Some(SslVersion::TLS1_3)).map_err(fingerprint_error)?;
    builder.set_cipher_list(CHROME_CIPHERS).map_err(fingerprint_error)?;
    builder.set_curves_list(CHROME_CURVES).map_err(fingerprint_error)?;
    builder.set_sigalgs_list(CHROME_SIGALGS).map_err(fingerprint_error)?;
    Ok(())
}

/// ALPN protocol list in wire format (length-prefixed names)
pub fn alpn_wire(protocols: &[Vec<u8>]) -> Vec<u8> {
    protocols
        .iter()
        .flat_map(|p| std::iter::once(p.len() as u8).chain(p.iter().copied()))
        .collect()
}

fn fingerprint_error(e: boring::error::ErrorStack) -> ProbeError {
    ProbeError::Tls(format!("failed to apply Chrome fingerprint: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boring::ssl::{SslConnector, SslMethod};

    #[test]
    fn chrome_fingerprint_applies_to_a_fresh_connector() -> Result<()> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| ProbeError::Tls(e.to_string()))?;
        apply_chrome_fingerprint(&mut builder)?;
        let _connector = builder.build();
        Ok(())
    }

    #[test]
    fn alpn_names_are_length_prefixed() {
        let wire = alpn_wire(&[b"h2".to_vec(), b"http/1.1".to_vec()]);
        assert_eq!(wire, b"\x02h2\x08http/1.1");
        assert!(alpn_wire(&[]).is_empty());
    }
}
