#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod probe;
pub mod telemetry;
pub mod tls;

pub use config::{load_from_path, Config, Destination, ProxyVersion};
pub use error::{ProbeError, Result};
pub use probe::{AlpnProfile, ProbeCache, ProbeKey, ProbeResult, ProbeSettings, Prober, RecordLens};
pub use tls::{ChromeEngine, ProfileEngine, RustlsEngine, TlsEngine};
