pub mod handlers;
pub mod types;

pub use handlers::{AppState, RequestFailure};

use crate::{Result, config::ServerConfig, pipeline::TextGenerationPipeline};
use axum::{Router, extract::DefaultBodyLimit, routing::post};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(handlers::generate))
        // Prompts have no size cap; oversized bodies must not turn into a 413.
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: ServerConfig, pipeline: Arc<dyn TextGenerationPipeline>) -> Result<()> {
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = TcpListener::bind(addr).await?;

    serve(listener, pipeline).await
}

/// Serves on an already bound listener until Ctrl+C.
pub async fn serve(listener: TcpListener, pipeline: Arc<dyn TextGenerationPipeline>) -> Result<()> {
    let app = router(AppState::new(pipeline));

    info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
