//! HTTP surface: route table plus handlers.

pub mod chat;
pub mod error;
pub mod health;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors_allow_any = state.config.cors_allow_any;

    let app = Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/health", get(health::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Only for a front-end served from another origin.
    if cors_allow_any {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
