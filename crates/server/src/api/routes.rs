use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{concerts, handlers, jobs, middleware::metrics_middleware, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Job runs
        .route("/jobs", post(jobs::launch_job).get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/stop", post(jobs::stop_job))
        // Concerts (local catalog tables and issued tickets)
        .route("/concerts/{id}", put(concerts::put_concert))
        .route("/concerts/{id}/tickets", get(concerts::list_concert_tickets))
        .route("/concerts/{id}/tickets/count", get(concerts::count_concert_tickets))
        // Tickets
        .route(
            "/tickets/{id}",
            get(tickets::get_ticket).delete(tickets::delete_ticket),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
