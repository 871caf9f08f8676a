//! Document store gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ session / fixation / CSRF middleware ──▶ handlers
//!                                                                          │
//!                                                                          ▼
//!                                               soap::SoapClient (envelope, signing)
//!                                                                          │
//!                                                                          ▼
//!                          remote::RemoteExecutor ── ClientCache ── BufferPool
//!                                                                          │
//!                                                                          ▼
//!                                                                  Remote webservice
//!
//!   Cross-cutting: config (TOML + watcher), observability (tracing, metrics),
//!                  lifecycle (signals, shutdown)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use docstore_gateway::config::watcher::ConfigWatcher;
use docstore_gateway::config::{load_config, GatewayConfig};
use docstore_gateway::lifecycle::{wait_for_signal, Shutdown};
use docstore_gateway::observability::{logging, metrics};
use docstore_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "docstore-gateway")]
#[command(about = "Document store gateway", long_about = None)]
struct Args {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "docstore.toml")]
    config: PathBuf,

    /// Do not reload the configuration file on change.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_exists = args.config.exists();
    let config = if config_exists {
        load_config(&args.config)?
    } else {
        GatewayConfig::default()
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "docstore-gateway starting");
    if !config_exists {
        tracing::warn!(path = ?args.config, "Config file not found, using defaults");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        webservices = config.webservices.len(),
        users = config.auth.users.len(),
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

    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
        });
    }

    let server = HttpServer::new(config.clone());

    // The watcher stops when dropped; keep it for the life of the server.
    let _watcher = if config_exists && !args.no_watch {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        server.spawn_reload(updates);
        Some(watcher.run()?)
    } else {
        None
    };

    match config.listener.tls.clone() {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            server.run_tls(addr, &tls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
