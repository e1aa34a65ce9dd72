//! laterq capacity service
//!
//! Periodically (and on demand over HTTP) moves tasks out of task pools that
//! are over capacity and notifies the pool owners.

use std::sync::Arc;

use anyhow::Result;
use laterq_capacity::{
    api,
    capacity::{CapacityChecker, CapacityWorker},
    config,
    db::Database,
    push::{FcmSender, LogSender, PushSender},
    state::AppState,
    store::{MemoryStore, Storage},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {e}");
        }
    }

    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to LATERQ_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting laterq capacity service");
    info!(listen_addr = %config.listen_addr, dev_mode = config.dev_mode, "Configuration loaded");

    let storage: Arc<dyn Storage> = match &config.database {
        Some(db_config) => {
            let db = match Database::connect(db_config).await {
                Ok(db) => {
                    info!("Database connection established");
                    db
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    return Err(e.into());
                }
            };

            // Run migrations in dev mode
            if config.dev_mode {
                info!("Running database migrations (dev mode)");
                if let Err(e) = db.run_migrations().await {
                    error!(error = %e, "Failed to run migrations");
                    return Err(e.into());
                }
            }
            Arc::new(db)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory storage (dev mode)");
            Arc::new(MemoryStore::new())
        }
    };

    let push: Arc<dyn PushSender> = match &config.fcm {
        Some(fcm) => {
            info!(project_id = %fcm.project_id, "FCM push delivery enabled");
            Arc::new(FcmSender::new(fcm)?)
        }
        None => {
            warn!("FCM not configured; push messages will only be logged");
            Arc::new(LogSender)
        }
    };

    let checker = Arc::new(CapacityChecker::new(
        Arc::clone(&storage),
        push,
        config.checker.clone(),
    ));

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start capacity worker in background
    let worker_handle = if config.check_interval.is_zero() {
        info!("Periodic capacity checks disabled");
        None
    } else {
        let worker = CapacityWorker::new(Arc::clone(&checker), config.check_interval);
        let shutdown_rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            worker.run(shutdown_rx).await;
        }))
    };

    // Create application state
    let state = AppState::new(storage, checker, config.job_timeout);

    // Build and run the server
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown to the worker
    let _ = shutdown_tx.send(true);

    if let Some(handle) = worker_handle {
        info!("Waiting for capacity worker to shut down...");
        let shutdown_timeout = std::time::Duration::from_secs(10);
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(error = %e, "Capacity worker did not shut down in time");
        }
    }

    info!("Capacity service shutdown complete");
    Ok(())
}
