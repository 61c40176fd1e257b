use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(
            // Outermost first: the request id is set before the trace span reads it
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Sessions
        .route("/sessions", post(handlers::open_session))
        .route(
            "/sessions/:key",
            get(handlers::get_session).delete(handlers::end_session),
        )
        .route("/sessions/:key/views", post(handlers::track_view))
        .route("/sessions/:key/scroll", post(handlers::update_scroll))
        .route("/sessions/:key/searches", post(handlers::track_search))
        .route("/sessions/:key/searches/clicks", post(handlers::track_search_click))
        .route("/sessions/:key/comparisons", post(handlers::track_comparison))
        .route("/sessions/:key/comparisons/end", post(handlers::end_comparison))
        .route("/sessions/:key/favorites", post(handlers::track_favorite))
        .route("/sessions/:key/interactions", post(handlers::track_interaction))
        .route("/sessions/:key/suspend", post(handlers::suspend_session))
        .route("/sessions/:key/resume", post(handlers::resume_session))
        .route("/sessions/:key/flush", post(handlers::flush_session))
        .route(
            "/sessions/:key/behavior",
            delete(handlers::clear_behavior),
        )
        // Users
        .route("/users/:user_id/preferences", get(handlers::get_preference_weights))
        .route("/users/:user_id/recommendations", get(handlers::get_user_recommendations))
        // Recommendations
        .route("/recommendations", post(handlers::recommend))
}
