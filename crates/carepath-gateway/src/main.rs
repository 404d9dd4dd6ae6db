use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

mod app;
mod http;
mod metrics;
mod ws;

/// Command-line flags for the orchestrator gateway binary.
#[derive(Parser, Debug)]
#[command(name = "carepath-gateway")]
struct Args {
    /// Path to the orchestrator.toml config file. Falls back to
    /// ./orchestrator.toml, then compiled-in defaults, if unset.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carepath_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();

    let config = carepath_core::config::OrchestratorConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        carepath_core::config::OrchestratorConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState::new(config).await?);
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("carepath gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    state.shutdown().await;
    Ok(())
}
