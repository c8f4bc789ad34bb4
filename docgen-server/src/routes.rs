use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(handlers::generate))
        .route("/generate/podcast", post(handlers::generate_podcast))
        .route("/generate/mindmap", post(handlers::generate_mindmap))
        .route("/generate/faq", post(handlers::generate_faq))
        .route("/upload", post(handlers::upload))
        .route("/download/{*path}", get(handlers::download))
        .route("/health", get(handlers::health))
        .route("/session/{session_id}", get(handlers::session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
