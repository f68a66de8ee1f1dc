use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::metrics_middleware;
use super::{audit, handlers, stories, story_types};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Story types
        .route("/story-types", get(story_types::list_story_types))
        // Stories
        .route(
            "/stories",
            post(stories::create_story).get(stories::list_stories),
        )
        .route(
            "/stories/{id}",
            get(stories::get_story)
                .post(stories::advance_story)
                .delete(stories::delete_story),
        )
        .route("/stories/{id}/events", get(stories::story_events))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
