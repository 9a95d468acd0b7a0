use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seatbatch_core::{
    load_config, validate_config, ConcertCatalog, JobOrchestrator, JobStore, LogFormat,
    SqliteConcertCatalog, SqliteJobStore, SqliteTicketSink, TicketRepository, TicketSink,
};
use seatbatch_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialized if configuration failed
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("SEATBATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Initialize logging
    init_logging(config.logging.format);

    info!("Configuration loaded from {:?}", config_path);
    info!("Database path: {:?}", config.database.path);

    // Catalog, tickets, and job state share one SQLite file
    let catalog = Arc::new(
        SqliteConcertCatalog::new(&config.database.path)
            .context("Failed to open concert catalog")?,
    );
    let tickets = Arc::new(
        SqliteTicketSink::new(&config.database.path).context("Failed to open ticket sink")?,
    );
    let jobs: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to open job store")?,
    );
    info!("Stores initialized");

    let orchestrator = Arc::new(JobOrchestrator::new(
        config.engine.clone(),
        Arc::clone(&catalog) as Arc<dyn ConcertCatalog>,
        Arc::clone(&tickets) as Arc<dyn TicketSink>,
        jobs,
    ));

    // Runs left RUNNING by a previous process become resumable
    let recovered = orchestrator
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted job runs")?;
    if !recovered.is_empty() {
        info!(
            "Recovered {} interrupted job runs; relaunch them to resume",
            recovered.len()
        );
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&orchestrator),
        catalog,
        tickets as Arc<dyn TicketRepository>,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Executing runs stop at their next chunk boundary and stay resumable
    info!("Stopping job runs...");
    orchestrator.shutdown().await;
    info!("Server shut down");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
