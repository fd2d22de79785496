use axum::{
    extract::DefaultBodyLimit,
    http::{header::HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use super::handlers;
use super::state::AppState;

/// Largest accepted speech upload
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

pub const COOP_VALUE: &str = "same-origin";
pub const COEP_VALUE: &str = "require-corp";

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Assistant
        .route("/api/chat", post(handlers::chat))
        .route(
            "/api/speech",
            post(handlers::speech).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        // Diagnostics (HEAD is served from the GET handler)
        .route("/api/check-cors", get(handlers::check_cors))
        // Browser audio APIs need a cross-origin isolated page
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static(COOP_VALUE),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static(COEP_VALUE),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
