//! HTTP relay between the chat widget and the hosted LLM
//!
//! - POST /api/chat - Answer a visitor question
//! - POST /api/speech - Transcribe an uploaded recording
//! - GET /api/check-cors - Report the cross-origin isolation headers
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};

pub use routes::create_router;
pub use state::AppState;

/// Bind and serve until Ctrl+C
pub async fn serve(bind: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("HTTP server error")
}
