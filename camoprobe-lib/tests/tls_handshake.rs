use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use camoprobe_lib::config::TlsConfig;
use camoprobe_lib::{
    AlpnProfile, Destination, ProbeCache, ProbeKey, ProbeSettings, Prober, ProfileEngine,
    ProxyVersion, RustlsEngine,
};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const GREETING: &[u8] = b"hello from destination";

struct TestCert {
    der: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
    pem: NamedTempFile,
}

fn generate_cert() -> TestResult<TestCert> {
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let mut pem = NamedTempFile::new()?;
    pem.write_all(cert.pem().as_bytes())?;
    Ok(TestCert {
        der: CertificateDer::from(cert.der().to_vec()),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(signing_key.serialize_der())),
        pem,
    })
}

/// TLS destination that greets every client once the handshake completes
/// and then closes the session
async fn spawn_tls_destination(cert: &TestCert) -> TestResult<SocketAddr> {
    let mut config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(vec![cert.der.clone()], cert.key.clone_key())?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let _ = tls.write_all(GREETING).await;
                    let _ = tls.shutdown().await;
                }
            });
        }
    });
    Ok(addr)
}

#[tokio::test]
async fn probes_a_rustls_destination() -> TestResult<()> {
    let cert = generate_cert()?;
    let addr = spawn_tls_destination(&cert).await?;

    let tls = TlsConfig { ca_path: Some(cert.pem.path().to_string_lossy().into_owned()) };
    let engine = RustlsEngine::from_config(&tls)?;
    let cache = Arc::new(ProbeCache::new());
    let settings = ProbeSettings {
        connect_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(5),
        capture_window: Duration::from_secs(2),
    };
    let prober = Prober::new(engine, cache.clone(), settings);

    prober.detect(&Destination {
        dest: addr.to_string(),
        server_names: vec!["localhost".to_string()],
        xver: ProxyVersion::None,
    });
    prober.wait_idle().await;

    for alpn in AlpnProfile::ALL {
        let key = ProbeKey::new(addr.to_string(), "localhost", alpn);
        let lens = cache.record_lens(&key).ok_or("record lengths not resolved")?;
        // at least the greeting, sealed in one application data record
        assert!(!lens.is_empty(), "{key}: no records captured");
        assert!(lens.iter().all(|len| *len > 5), "{key}: {lens:?}");
        assert!(lens.iter().any(|len| *len > GREETING.len() + 5), "{key}: {lens:?}");

        // a rustls destination tolerates two duplicates before resetting
        assert_eq!(cache.max_ccs_count(&key), Some(2), "{key}");
    }
    Ok(())
}

#[tokio::test]
async fn chrome_hello_measures_the_same_destination() -> TestResult<()> {
    let cert = generate_cert()?;
    let addr = spawn_tls_destination(&cert).await?;

    let tls = TlsConfig { ca_path: Some(cert.pem.path().to_string_lossy().into_owned()) };
    let engine = ProfileEngine::from_config(&tls)?;
    let cache = Arc::new(ProbeCache::new());
    let settings = ProbeSettings {
        connect_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(5),
        capture_window: Duration::from_secs(2),
    };
    let prober = Prober::new(engine, cache.clone(), settings);

    prober.detect(&Destination {
        dest: addr.to_string(),
        server_names: vec!["localhost".to_string()],
        xver: ProxyVersion::None,
    });
    prober.wait_idle().await;

    for alpn in AlpnProfile::ALL {
        let key = ProbeKey::new(addr.to_string(), "localhost", alpn);
        let lens = cache.record_lens(&key).ok_or("record lengths not resolved")?;
        assert!(lens.iter().any(|len| *len > GREETING.len() + 5), "{key}: {lens:?}");

        let count = cache.max_ccs_count(&key).ok_or("ccs count absent")?;
        assert!((-2..=32).contains(&count), "{key}: {count}");
    }
    Ok(())
}

#[tokio::test]
async fn untrusted_certificate_settles_records_and_leaves_ccs_absent() -> TestResult<()> {
    let cert = generate_cert()?;
    let addr = spawn_tls_destination(&cert).await?;

    // webpki roots only: verification fails before the client writes its CCS
    let engine = RustlsEngine::with_webpki_roots()?;
    let cache = Arc::new(ProbeCache::new());
    let prober = Prober::new(engine, cache.clone(), ProbeSettings::default());

    prober.detect(&Destination {
        dest: addr.to_string(),
        server_names: vec!["localhost".to_string()],
        xver: ProxyVersion::None,
    });
    prober.wait_idle().await;

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), AlpnProfile::ALL.len());
    for report in &snapshot {
        assert_eq!(cache.record_lens(&report.key), Some(Vec::new()), "{}", report.key);
        assert_eq!(report.result.max_ccs_count, None, "{}", report.key);
    }

    let json = serde_json::to_value(&snapshot)?;
    let first = json.get(0).ok_or("empty report")?;
    assert_eq!(first["dest"], addr.to_string());
    assert_eq!(first["server_name"], "localhost");
    assert_eq!(first["alpn"], 0);
    assert_eq!(first["record_lens"], serde_json::json!([]));
    assert!(first["max_ccs_count"].is_null());
    Ok(())
}
