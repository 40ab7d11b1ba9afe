use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{health, messages},
    middleware::logging::logging_middleware,
    AppState,
};

/// Request bodies larger than this are refused before reaching a handler
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the router with every endpoint and the global middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/produce", post(messages::produce_message))
        .route(
            "/messages/:topic",
            get(messages::list_messages)
                .put(messages::update_message)
                .delete(messages::delete_messages),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
