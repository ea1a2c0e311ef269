pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod transport;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_user;
pub use rest::{
    complete_checkout_handler, health_handler, post_action_handler, post_document_handler,
    post_message_handler,
};
pub use state::AppState;

/// Largest accepted request body, sized for a document upload.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Builds the API routes. Conversation routes resolve the caller first.
pub fn router(app_state: Arc<AppState>) -> Router {
    let conversation_routes = Router::new()
        .route(
            "/conversations/{conversation_id}/documents",
            post(post_document_handler),
        )
        .route(
            "/conversations/{conversation_id}/actions",
            post(post_action_handler),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            post(post_message_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_user,
        ));

    let public_routes = Router::new()
        .route(
            "/payments/checkout/{session_id}/complete",
            post(complete_checkout_handler),
        )
        .route("/health", get(health_handler));

    Router::new()
        .merge(conversation_routes)
        .merge(public_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
