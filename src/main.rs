//! Edge Request Gateway
//!
//! Fronts an application and enforces the cross-cutting request policies.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                    EDGE GATEWAY                       │
//!                    │                                                       │
//!  Client Request    │  ┌────────┐   ┌──────────┐   ┌──────┐   ┌─────────┐  │
//!  ──────────────────┼─▶│ route  │──▶│   CSRF   │──▶│ auth │──▶│  rate   │──┼──▶ Upstream
//!                    │  │ match  │   │  guard   │   │ gate │   │  limit  │  │    App
//!                    │  └────────┘   └────┬─────┘   └──┬───┘   └────┬────┘  │
//!                    │                    │ 403        │           │ 429   │
//!                    │                    ▼            ▼           ▼       │
//!                    │  ┌──────────────────────────────────────────────┐    │
//!                    │  │ request context · structured logger · PII     │    │
//!                    │  │ sanitizer · telemetry · metrics               │    │
//!                    │  └──────────────────────────────────────────────┘    │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{self, GatewayConfig};
use edge_gateway::observability::{logging, metrics};
use edge_gateway::{Gateway, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Edge request gateway", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config: GatewayConfig = match config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    logging::init_tracing(&config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "edge-gateway starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        rate_limit_backend = ?config.rate_limit.backend,
        request_timeout_secs = config.timeouts.request_secs,
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

    let gateway = Gateway::from_config(&config).await?;
    let server = HttpServer::new(&config, gateway)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();
    server.run(listener, shutdown.wait()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
