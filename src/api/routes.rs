//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_memory_handler, clear_persistent_handler, delete_handler, get_handler, health_handler,
    set_handler, stats_handler, sync_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - Store a key-value pair
/// - `GET /get/:key` - Retrieve a value from either tier
/// - `DELETE /del/:key` - Delete a key from the memory tier
/// - `POST /clear/memory` - Wipe the memory tier
/// - `POST /clear/persistent` - Blank every value on the persistent tier
/// - `POST /sync` - Run one sync pass now
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/clear/memory", post(clear_memory_handler))
        .route("/clear/persistent", post(clear_persistent_handler))
        .route("/sync", post(sync_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
