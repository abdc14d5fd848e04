//! HTTP surface of the relay: router, WebSocket upgrade handling and server bootstrap.

use log::*;
use std::future::Future;
use tokio::net::TcpListener;

pub use service::AppState;

mod controller;
pub mod error;
pub mod router;
pub(crate) mod socket;

/// Bind the configured interface/port and serve until Ctrl-C or SIGTERM.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let bind_address = app_state.config.bind_address();
    let listener = TcpListener::bind(&bind_address).await?;

    serve(listener, app_state, shutdown_signal()).await
}

/// Serve the relay on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    app_state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        "Relay hub listening on {} ({} environment), socket path {}",
        listener.local_addr()?,
        app_state.config.runtime_env(),
        app_state.config.socket_path()
    );

    let app = router::define_routes(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Relay hub shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
