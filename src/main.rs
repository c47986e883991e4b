use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pgidle::cli::Cli;
use pgidle::config::Settings;
use pgidle::orchestrator::{Orchestrator, SpawnOptions};
use pgidle::tasks::MonitorTask;

#[tokio::main]
async fn main() -> Result<()> {
    // Flag validation happens before any connection work
    let cli = Cli::parse();

    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!(database = %settings.database.describe(), "Configuration loaded");

    let orchestrator = Arc::new(Orchestrator::new(settings.database));

    // Subscribe before spawning so a signal delivered during the spawn pass
    // is observed at the monitor's first checkpoint
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(shutdown_signal_handler(shutdown_tx));

    // Spawn connections; fatal if none succeed
    orchestrator
        .spawn_connections(&SpawnOptions {
            count: cli.num_connections,
            init_query: cli.init_query,
            query_percent: cli.query_percent,
        })
        .await?;

    // Monitor until interrupted
    MonitorTask::new(orchestrator.clone(), shutdown_rx)
        .run()
        .await;

    // Close every held connection
    orchestrator.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, closing connections");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, closing connections");
        }
    }

    let _ = shutdown_tx.send(());
}
