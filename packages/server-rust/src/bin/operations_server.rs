//! Operations server binary.

use clap::Parser;
use operations_server::logging::init_logging;
use operations_server::storage::connect_store;
use operations_server::{NetworkModule, ServerArgs};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_logging(args.log_format, &args.log_level)?;

    let storage = args.storage_config();
    info!(backend = ?storage.backend, "connecting storage");
    let store = connect_store(&storage).await?;

    let mut module = NetworkModule::new(args.network_config(), store);
    let port = module.start().await?;
    info!(port, "operations server started");

    module.serve(shutdown_signal()).await?;
    info!("operations server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
