use anyhow::{Context, Result};
use axum::Router;
use s3fs_gateway::{config, routes, services::storage_service::StorageService};
use std::{future::IntoFuture, io::ErrorKind, path::Path};
use tokio::{net::TcpListener, signal, sync::oneshot, time::sleep};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .with_context(|| format!("invalid log level `{}`", cfg.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting s3fs-gateway with config: {:?}", cfg);

    // --- Resolve and open storage root ---
    let root = std::path::absolute(Path::new(&cfg.storage_dir))
        .with_context(|| format!("resolving storage root {}", cfg.storage_dir))?;
    let storage = StorageService::open(&root)
        .await
        .context("failed to create S3 server")?
        .with_body_timeout(cfg.body_timeout);
    tracing::info!("Storage root: {}", root.display());

    // --- Build router ---
    let app: Router = routes::routes::app(storage);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    let local = listener.local_addr()?;
    tracing::info!("Server listening on http://{}", local);
    tracing::info!("Health check available at http://{}/health", local);

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    let shutdown_timeout = cfg.shutdown_timeout;
    let drain_deadline = async move {
        match signalled_rx.await {
            Ok(()) => sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => result.context("HTTP server error")?,
        _ = drain_deadline => tracing::warn!(
            "In-flight requests still running after {:?}, forcing shutdown",
            shutdown_timeout
        ),
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM. In-flight requests then get the configured
/// shutdown timeout to finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received interrupt signal, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
