//! Treewatch - Entry Point
//!
//! Runs the instrumented tree workers and serves their metrics.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use treewatch::worker::{join_workers, spawn_workers};
use treewatch::{Config, Dispatcher, InstrumentedTree, VERSION};

const DEFAULT_CONFIG: &str = "config.toml";

/// Application entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let explicit_path = std::env::args().nth(1).map(PathBuf::from);
    let config_path = explicit_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    // Load configuration; a missing default file means built-in defaults
    let config = if explicit_path.is_none() && !config_path.exists() {
        Config::default()
    } else {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    };

    treewatch::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting Treewatch"
    );

    // Metric registration failures are fatal
    let dispatcher = Dispatcher::new(config.metrics.clone())
        .context("Failed to register metrics")?;
    let tree = Arc::new(InstrumentedTree::new(dispatcher.clone()));
    let shutdown = Arc::new(AtomicBool::new(false));

    let handles = spawn_workers(tree.clone(), &config.worker, shutdown.clone())
        .context("Failed to spawn worker threads")?;
    info!(workers = handles.len(), "Workers running");

    let workers = tokio::task::spawn_blocking(move || join_workers(handles));
    tokio::pin!(workers);

    tokio::select! {
        result = &mut workers => {
            let completed = result.context("Worker join task failed")?;
            info!(completed, nodes = tree.len(), "Workers finished");
            // Keep the final state scrapeable until asked to stop
            if dispatcher.server_addr().is_some() {
                shutdown_signal().await;
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping workers...");
            shutdown.store(true, Ordering::Relaxed);
            match workers.await {
                Ok(completed) => info!(completed, "Workers stopped"),
                Err(e) => error!(error = %e, "Worker join task failed"),
            }
        }
    }

    info!("Treewatch stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
