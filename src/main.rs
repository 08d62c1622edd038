//! Responses-Relay server entry point

use anyhow::{Context, Result};
use clap::Parser;
use responses_relay::{
    config::{self, LoggingSettings},
    web::{create_router, AppState},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve the Responses API on top of a Chat Completions provider
#[derive(Debug, Parser)]
#[command(name = "responses-relay", version, about)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    init_logging(&settings.logging);
    info!("Starting Responses-Relay v{}", responses_relay::VERSION);
    info!(
        upstream = %settings.upstream.base_url,
        providers = settings.providers.len(),
        web_search = settings.web_search.enabled,
        "configuration loaded"
    );

    let addr = SocketAddr::new(
        settings
            .server
            .host
            .parse()
            .with_context(|| format!("invalid server.host {}", settings.server.host))?,
        settings.server.port,
    );

    let state = AppState::new(settings)?;
    let app = create_router(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_logging(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
