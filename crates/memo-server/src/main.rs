//! memo-server - Memo HTTP server
//!
//! REST API over the session lifecycle manager and the memory coordinator.

use std::path::PathBuf;

use clap::Parser;
use memo_core::MemoConfig;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod error;
mod routes;
mod state;

use state::AppState;

/// Memo server
#[derive(Parser, Debug)]
#[command(name = "memo-server", version, about)]
struct Args {
    /// Config file (defaults to $MEMO_CONFIG or ~/.memo/config.toml)
    #[arg(short, long, env = "MEMO_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::from_default_env()
        .add_directive("memo_server=info".parse()?)
        .add_directive("memo_core=info".parse()?);
    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("memo-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &args.config {
        Some(path) => MemoConfig::load_from(path)?,
        None => MemoConfig::load()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate()?;
    info!(
        topology = ?config.memory.topology,
        dimension = config.vector.dimension,
        "Config loaded"
    );

    let bind = config.server.bind.clone();
    let state = AppState::from_config(config)?;
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
