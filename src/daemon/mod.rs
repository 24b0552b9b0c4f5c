//! Daemon mode: owns the translation pipeline and serves it over IPC.

pub mod handler;

use crate::config::Config;
use crate::error::{CaptransError, Result};
use crate::ipc::server::IpcServer;
use crate::pipeline::{NullSink, Pipeline};
use crate::store::{JsonFileStore, Store};
use crate::translate::OpenAiTranslator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

/// Run the daemon: open the store, start the pipeline and IPC server, wait
/// for a signal or a `shutdown` command.
pub async fn run_daemon(config: Config, socket_path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let store_path = config
        .daemon
        .store_path
        .clone()
        .unwrap_or_else(JsonFileStore::default_path);
    let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(&store_path).await?);
    tracing::info!(store = %store_path.display(), "store_opened");

    let pipeline = Pipeline::new(config.settings.clone())
        .start(
            Arc::clone(&store),
            Arc::new(OpenAiTranslator::new()),
            Box::new(NullSink),
        )
        .await?;

    let socket_path = socket_path
        .or_else(|| config.daemon.socket.clone())
        .unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path)?);

    if !quiet {
        eprintln!(
            "IPC server listening at: {}",
            server.socket_path().display()
        );
        eprintln!("Daemon ready.");
    }

    let shutdown = Arc::new(Notify::new());
    let handler =
        handler::DaemonCommandHandler::new(pipeline.clone(), store, Arc::clone(&shutdown));

    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nReceived SIGINT, shutting down...");
            }
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "signal handler setup failed");
            }
            if !quiet {
                eprintln!("\nReceived SIGTERM, shutting down...");
            }
        }
        _ = shutdown.notified() => {
            if !quiet {
                eprintln!("Shutdown requested, stopping...");
            }
        }
    }

    server.stop().await?;
    pipeline.shutdown().await?;

    match server_handle.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "ipc server exited with error"),
        Err(e) => tracing::warn!(error = %e, "ipc server task failed"),
        Ok(Ok(())) => {}
    }

    if !quiet {
        eprintln!("Daemon stopped.");
    }

    Ok(())
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| CaptransError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}
