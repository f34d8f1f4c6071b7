//! Rendezvous proxy hub (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────┐
//!                         │                   HUB                    │
//!                         │                                          │
//!   Registrant ── dial ───┼─▶ registration endpoint (REGISTER → 101) │
//!   (behind NAT)          │            │                             │
//!                         │            ▼                             │
//!                         │   ┌──────────────────┐                   │
//!                         │   │ registry (FIFO)  │ standby conns     │
//!                         │   └────────┬─────────┘                   │
//!                         │            │ take                        │
//!   Client ── request ────┼─▶ forwarding endpoint ── splice ─────────┼──▶ Registrant
//!          ◀── response ──┼──                     ◀── response ──────┼───
//!                         └──────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use rendezvous_proxy::config::{load_hub_config, validate_hub_config, HubConfig};
use rendezvous_proxy::lifecycle::{spawn_signal_handler, Shutdown};
use rendezvous_proxy::observability::{logging, metrics};
use rendezvous_proxy::registry::Selection;
use rendezvous_proxy::HubServer;

#[derive(Parser, Debug)]
#[command(name = "rendezvous-proxy")]
#[command(about = "Hub forwarding client requests to registered standby connections", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Forwarding endpoint bind address.
    #[arg(long)]
    http_addr: Option<String>,

    /// Registration endpoint bind address.
    #[arg(long)]
    register_addr: Option<String>,

    /// Standby selection: fifo or pattern.
    #[arg(long, value_parser = parse_selection)]
    selection: Option<Selection>,
}

fn parse_selection(s: &str) -> Result<Selection, String> {
    match s.to_ascii_lowercase().as_str() {
        "fifo" => Ok(Selection::Fifo),
        "pattern" => Ok(Selection::Pattern),
        other => Err(format!("unknown selection {:?} (expected fifo or pattern)", other)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_hub_config(path)?,
        None => HubConfig::default(),
    };
    if let Some(addr) = cli.http_addr {
        config.forwarding.bind_address = addr;
    }
    if let Some(addr) = cli.register_addr {
        config.registration.bind_address = addr;
    }
    if let Some(selection) = cli.selection {
        config.registry.selection = selection;
    }

    logging::init_tracing(&config.observability.log_level);

    tracing::info!("rendezvous-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = validate_hub_config(&config) {
        for e in &errors {
            tracing::error!(error = %e, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    tracing::info!(
        forwarding = %config.forwarding.bind_address,
        registration = %config.registration.bind_address,
        selection = ?config.registry.selection,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    HubServer::new(config).run(&shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
