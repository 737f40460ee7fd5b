use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

mod handlers;
mod middleware;
mod routes;
mod state;

use common::clock::{Clock, SystemClock};
use common::config::Settings;
use common::dispatcher::Dispatcher;
use common::registry::ReminderRegistry;
use common::scheduler::{Scheduler, SchedulerEngine};
use common::telemetry;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Settings::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.json_logs,
    )?;
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        Some(telemetry::init_metrics()?)
    } else {
        None
    };

    // Engine: registry, dispatcher and scheduler loop share one clock
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(ReminderRegistry::new(clock.clone()));
    let dispatcher = Arc::new(
        Dispatcher::from_config(registry.clone(), &config.delivery)
            .context("Failed to create webhook dispatcher")?,
    );
    let engine = Arc::new(SchedulerEngine::new(
        &config.scheduler,
        registry.clone(),
        dispatcher,
        clock,
    ));

    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.start().await {
                tracing::error!(error = %e, "Scheduler engine failed");
            }
        })
    };

    // Create router
    let state = AppState::new(registry, config.clone(), metrics_handle);
    let app = routes::create_router(state);

    // Start server
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .context("Invalid server host")?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop ticking, then let in-flight deliveries drain
    engine
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to stop scheduler: {}", e))?;
    engine_task.await.context("Scheduler task panicked")?;

    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
