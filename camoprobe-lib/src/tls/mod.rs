pub mod chrome;
pub mod engine;
pub mod fingerprint;

pub use chrome::ChromeEngine;
pub use engine::{ProbeIo, ProfileEngine, RustlsEngine, TlsEngine};
pub use fingerprint::{apply_chrome_fingerprint, ClientFingerprint};
