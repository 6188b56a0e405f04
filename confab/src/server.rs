//! HTTP server wiring and shutdown handling

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use confab_api::http::create_router;
use confab_signal::{Config, Coordinator};

/// Serve the HTTP API until Ctrl+C or a fatal engine failure.
///
/// Losing the engine worker is the one unrecoverable condition: without it
/// no routing is possible, so the process exits with an error instead of
/// limping along answering signaling requests it cannot honor.
pub async fn run(config: &Config, coordinator: Arc<Coordinator>) -> Result<()> {
    let mut fatal = coordinator.fatal_signal();
    let router = create_router(coordinator);

    let addr = config.http_address();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("failed to bind {addr}: {e}");
        anyhow::anyhow!("failed to bind {addr}: {e}")
    })?;
    info!("listening on http://{addr}");

    let shutdown_fatal = fatal.clone();
    let graceful = async move {
        let mut fatal = shutdown_fatal;
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install Ctrl+C handler: {e}");
            }
        };
        tokio::select! {
            () = ctrl_c => { info!("received Ctrl+C, shutting down"); }
            _ = fatal.changed() => { info!("fatal engine failure, shutting down"); }
        }
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful)
        .await?;

    if *fatal.borrow_and_update() {
        return Err(anyhow::anyhow!("media engine worker died"));
    }
    info!("server stopped");
    Ok(())
}
