//! Tessera API Server Entry Point
//!
//! Bootstraps configuration, connects the fast and durable layers, spawns the
//! sync task and serves HTTP until Ctrl-C or SIGTERM.

use std::sync::Arc;

use tokio::sync::watch;

use tessera_api::telemetry::{init_tracing, TelemetryConfig};
use tessera_api::{
    create_router, sync_task, ApiError, ApiResult, AppState, KvService, QuotaBackendKind,
    QuotaLimiter, ServiceConfig, SyncEngine,
};
use tessera_storage::{
    PgDurableStore, QuotaBackend, RedisFastStore, RedisQuotaBackend, WindowCounters,
};

fn startup_error(what: &str, err: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "Failed to initialize {}", what);
    ApiError::internal_error(format!("Failed to initialize {}: {}", what, err))
}

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let config = ServiceConfig::from_env()?;
    config.validate()?;
    let addr = config.socket_addr()?;

    // Store connection failures are the only fatal errors.
    let fast = Arc::new(
        RedisFastStore::connect(&config.redis_url)
            .await
            .map_err(|e| startup_error("fast layer", e))?,
    );
    let durable = Arc::new(
        PgDurableStore::connect(&config.database)
            .await
            .map_err(|e| startup_error("durable layer", e))?,
    );
    durable
        .ensure_schema()
        .await
        .map_err(|e| startup_error("durable schema", e))?;

    let quota_backend: Arc<dyn QuotaBackend> = match config.quota_backend {
        QuotaBackendKind::Memory => Arc::new(WindowCounters::new()),
        QuotaBackendKind::Redis => Arc::new(
            RedisQuotaBackend::connect(&config.redis_url)
                .await
                .map_err(|e| startup_error("quota counters", e))?,
        ),
    };
    let limiter = QuotaLimiter::new(quota_backend, config.quota);

    let service = KvService::new(fast.clone(), durable.clone(), limiter.clone());
    let engine = Arc::new(SyncEngine::new(fast, durable, config.sync.tenant_cap_bytes));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_handle = tokio::spawn(sync_task(
        engine,
        limiter,
        config.sync.clone(),
        shutdown_rx.clone(),
    ));

    let app = create_router(AppState::new(service));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, quota_backend = ?config.quota_backend, "Starting Tessera API server");

    let mut server_shutdown = shutdown_rx;
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let finished_early = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            None
        }
        result = &mut server => Some(result),
    };

    // Stops the listener and makes the sync task abandon its sweep.
    let _ = shutdown_tx.send(true);

    let server_result = match finished_early {
        Some(result) => Ok(result),
        None => tokio::time::timeout(config.shutdown_grace, server).await,
    };
    match server_result {
        Ok(Ok(Ok(()))) => tracing::info!("HTTP server drained"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task panicked"),
        Err(_) => tracing::warn!(
            grace_secs = config.shutdown_grace.as_secs(),
            "Grace period elapsed with requests still in flight"
        ),
    }

    match tokio::time::timeout(config.shutdown_grace, sync_handle).await {
        Ok(Ok(metrics)) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                cycles = snapshot.cycles,
                evictions = snapshot.evictions,
                "Sync task stopped"
            );
        }
        Ok(Err(e)) => tracing::error!(error = %e, "Sync task panicked"),
        Err(_) => tracing::warn!("Sync task did not stop within the grace period"),
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
