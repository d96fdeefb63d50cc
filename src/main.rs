use anyhow::Context;
use ryos_snapshot::config::AppConfig;
use ryos_snapshot::persistence::{DiskFlatStore, DiskObjectStore, FlatStore, ObjectStoreBackend};
use ryos_snapshot::routes;
use ryos_snapshot::services::migration::migrate_live_storage;
use ryos_snapshot::services::reconcile::reconcile_metadata;
use ryos_snapshot::services::restart::{take_boot_message, ShutdownRestart};
use ryos_snapshot::state::AppState;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting ryos-snapshot v{}", env!("CARGO_PKG_VERSION"));

    let flat: Arc<dyn FlatStore> = Arc::new(
        DiskFlatStore::open(&config.flat_store_path()).context("Failed to open flat store")?,
    );
    let objects: Arc<dyn ObjectStoreBackend> = Arc::new(
        DiskObjectStore::open(&config.object_store_dir())
            .context("Failed to open object stores")?,
    );

    if let Some(message) = take_boot_message(flat.as_ref()) {
        tracing::info!(message = %message, "Booting after restart");
    }

    // Boot recovery: one-time key migration, then metadata reconciliation
    match migrate_live_storage(flat.as_ref(), objects.as_ref()).await {
        Ok(Some(report)) => tracing::info!(
            rekeyed = report.rekeyed,
            adopted = report.adopted,
            linked = report.linked_entries,
            synthesized = report.synthesized_entries,
            "Migrated legacy record keys"
        ),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Legacy key migration failed"),
    }
    if let Err(e) = reconcile_metadata(flat.as_ref(), objects.as_ref()).await {
        tracing::error!(error = %e, "Boot reconciliation failed");
    }

    // Shutdown signal, also raised by restart requests
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let restart = Arc::new(ShutdownRestart::new(flat.clone(), shutdown_tx));

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, flat, objects, restart);
    let app = routes::build_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(mut restart_rx: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let restart = async {
        let requested = restart_rx.wait_for(|requested| *requested).await.is_ok();
        if !requested {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Shutdown signal received"),
        _ = terminate => tracing::info!("Shutdown signal received"),
        _ = restart => tracing::info!("Restart requested, shutting down"),
    }
}
