mod loader;
pub mod types;
mod validator;

pub use loader::load_from_path;
pub use types::{Config, Destination, LoggingConfig, ProxyVersion, TimeoutConfig, TlsConfig};
pub use validator::{validate, validate_dest_addr};
