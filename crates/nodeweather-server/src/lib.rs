//! REST API for favorites, history and stats.

pub mod handlers;
pub mod routes;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;
use nodeweather_storage::{RecordStore, Services};

pub use routes::routes;

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve_until<S, F>(
    services: Services<S>,
    addr: SocketAddr,
    shutdown: F,
) -> anyhow::Result<()>
where
    S: RecordStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(services))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("NodeWeather API listening on http://{}/api", bound);
    server.await;
    tracing::info!("NodeWeather API stopped");
    Ok(())
}

/// Serve the API on `addr` until Ctrl-C.
pub async fn serve<S: RecordStore + 'static>(
    services: Services<S>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    serve_until(services, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    })
    .await
}
