use std::net::SocketAddr;
use std::path::Path;

use crate::config::types::{Config, Destination};

pub fn validate(config: &Config) -> Result<(), String> {
    if config.destinations.is_empty() {
        return Err("at least one destination is required".into());
    }
    for destination in &config.destinations {
        validate_destination(destination)?;
    }
    if config.timeout.connect_ms == 0 {
        return Err("connect_ms must be > 0".into());
    }
    if config.timeout.tls_handshake_secs == 0 {
        return Err("tls_handshake_secs must be > 0".into());
    }
    if let Some(ca_path) = &config.tls.ca_path {
        if !Path::new(ca_path).exists() {
            return Err(format!("CA file not found: {ca_path}"));
        }
    }
    Ok(())
}

fn validate_destination(destination: &Destination) -> Result<(), String> {
    validate_dest_addr(&destination.dest)
        .map_err(|e| format!("invalid destination {:?}: {e}", destination.dest))?;
    if destination.server_names.is_empty() {
        return Err(format!("destination {} has no server names", destination.dest));
    }
    if destination.server_names.iter().any(|s| s.trim().is_empty()) {
        return Err(format!("destination {} has an empty server name", destination.dest));
    }
    Ok(())
}

/// Accepts `ip:port`, `[v6]:port` or `host:port`
pub fn validate_dest_addr(dest: &str) -> Result<(), String> {
    if dest.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }

    let (host, port) = dest.rsplit_once(':').ok_or_else(|| "missing port number".to_string())?;

    if !is_valid_domain(host) {
        return Err("invalid domain name".to_string());
    }

    port.parse::<u16>().map_err(|_| "invalid port number".to_string())?;
    Ok(())
}

fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}
