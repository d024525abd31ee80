//! crosscast-server - HTTP API for the social platform connector layer
//!
//! Serves the `/api/social/*` surface over axum. All platform access
//! goes through the connector service; this binary is routing, error
//! mapping, and process lifecycle only.

mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use libcrosscast::logging::{LogFormat, LoggingConfig};
use libcrosscast::{Config, ConnectorService};

#[derive(Parser, Debug)]
#[command(name = "crosscast-server")]
#[command(version)]
#[command(about = "HTTP API server for the Crosscast connector layer")]
struct Cli {
    /// Path to the config file (default: XDG config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = std::env::var("CROSSCAST_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);
    LoggingConfig::new(format, "info".to_string(), cli.verbose).init();

    let config = load_config(cli.config.as_ref())?;
    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);

    let service = Arc::new(ConnectorService::from_config(&config).await?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(service)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", host, port);
    info!("crosscast-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("crosscast-server stopped");
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from_path(path)?),
        None => match Config::load() {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!("No config file found ({}); using defaults", err);
                Ok(Config::default_config())
            }
        },
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to install shutdown handler: {}", err);
        return;
    }
    info!("Shutdown signal received");
}
