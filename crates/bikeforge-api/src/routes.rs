use crate::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/chat/complete", post(handlers::chat_complete))
        .route(
            "/chat/{session_id}/specification",
            get(handlers::get_specification),
        )
        .route("/image/generate", post(handlers::generate_image))
        .route(
            "/image/download/{session_id}",
            get(handlers::download_image),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
