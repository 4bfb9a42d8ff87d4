//! Destination fingerprinting: post-handshake record lengths and duplicate
//! CCS tolerance, measured once per (destination, server name, ALPN profile)

pub mod cache;
pub mod ccs;
pub mod key;
pub mod observer;
pub mod prober;
pub mod proxy_protocol;
pub mod record;

pub use cache::{ProbeCache, ProbeReport, ProbeResult, RecordLens};
pub use ccs::{CcsProber, CCS_COUNT_OFFSET, MAX_CCS_ATTEMPTS};
pub use key::{AlpnProfile, ProbeKey};
pub use observer::{PostHandshakeObserver, CAPTURE_WINDOW};
pub use prober::{ProbeSettings, Prober};
pub use record::record_lengths;
