#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use pairs::config::{Args, LogFormat, ServerConfig};
use pairs::metrics::{start_metrics_server, HealthState};
use pairs::run_with_shutdown;
use pairs::server::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config: ServerConfig = args.into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let state = Arc::new(ServerState::new(config.clone()));

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    let health_state = HealthState::new();

    tokio::spawn({
        let health_state = health_state.clone();
        let state = Arc::clone(&state);
        async move {
            if let Err(e) = start_metrics_server(config.metrics_addr, health_state, state).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("received shutdown signal");
        health_state.set_ready(false);
    };

    if let Err(e) = run_with_shutdown(listener, state, shutdown).await {
        tracing::error!("server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}
