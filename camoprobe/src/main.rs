#![forbid(unsafe_code)]

use camoprobe_lib::config::load_from_path;
use camoprobe_lib::probe::{ProbeCache, ProbeSettings, Prober};
use camoprobe_lib::telemetry::init_tracing;
use camoprobe_lib::ProfileEngine;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Camouflage destination prober")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "config/probe.toml")]
    config: PathBuf,

    /// Give up waiting for probes after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 120, env = "CAMOPROBE_WAIT_SECS")]
    wait_secs: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(&cfg.logging.level, cfg.logging.show_target) {
        eprintln!("{err}");
        std::process::exit(1);
    }
    info!(destinations = cfg.destinations.len(), "configuration loaded");

    let engine = match ProfileEngine::from_config(&cfg.tls) {
        Ok(engine) => engine,
        Err(err) => {
            error!(%err, "failed to build TLS engine");
            std::process::exit(1);
        }
    };

    let cache = Arc::new(ProbeCache::new());
    let prober = Prober::new(engine, cache.clone(), ProbeSettings::from(&cfg.timeout));
    for destination in &cfg.destinations {
        prober.detect(destination);
    }

    let wait = Duration::from_secs(cli.wait_secs);
    tokio::select! {
        _ = prober.wait_idle() => info!("all probes finished"),
        _ = tokio::time::sleep(wait) => {
            warn!(in_flight = prober.in_flight(), "wait limit reached, reporting partial results");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(in_flight = prober.in_flight(), "interrupted, reporting partial results");
        }
    }

    match serde_json::to_string_pretty(&cache.snapshot()) {
        Ok(report) => println!("{report}"),
        Err(err) => {
            error!(%err, "failed to serialize results");
            std::process::exit(1);
        }
    }
}
