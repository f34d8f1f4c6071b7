//! Demo registrant: serves "Hello, World" through a rendezvous hub.

use std::path::PathBuf;

use axum::{routing::get, Router};
use clap::Parser;

use rendezvous_proxy::config::{load_registrant_config, validate_registrant_config, RegistrantConfig};
use rendezvous_proxy::lifecycle::{spawn_signal_handler, Shutdown};
use rendezvous_proxy::net::Network;
use rendezvous_proxy::observability::logging;
use rendezvous_proxy::{serve, Listener};

#[derive(Parser, Debug)]
#[command(name = "demo-backend")]
#[command(about = "Example service registering with a rendezvous hub", long_about = None)]
struct Cli {
    /// Path to a TOML registrant configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network used to reach the hub (tcp or unix).
    #[arg(long, env = "RENDEZVOUS_NETWORK")]
    network: Option<Network>,

    /// Hub registration endpoint.
    #[arg(long, env = "RENDEZVOUS_HUB_ADDRESS")]
    hub_address: Option<String>,

    /// Registration URL announced to the hub.
    #[arg(long, env = "RENDEZVOUS_REGISTRATION")]
    registration: Option<String>,

    /// Maximum registered, unconsumed connections (0 means 5).
    #[arg(long, env = "RENDEZVOUS_POOL_SIZE")]
    pool_size: Option<usize>,
}

async fn hello() -> &'static str {
    "Hello, World"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing("demo_backend=debug,rendezvous_proxy=debug");

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_registrant_config(path)?,
        None => RegistrantConfig::default(),
    };
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(addr) = cli.hub_address {
        config.hub_address = addr;
    }
    if let Some(registration) = cli.registration {
        config.registration = registration;
    }
    if let Some(pool_size) = cli.pool_size {
        config.pool_size = pool_size;
    }

    if let Err(errors) = validate_registrant_config(&config) {
        for e in &errors {
            tracing::error!(error = %e, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    let listener = Listener::new(&config)?;
    let router = Router::new()
        .route("/", get(hello))
        .route("/{*path}", get(hello));

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    serve(&listener, router, &shutdown).await?;

    tracing::info!("demo-backend stopped");
    Ok(())
}
