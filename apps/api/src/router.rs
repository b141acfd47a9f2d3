use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use match_cell::router::match_routes;
use shared_database::AppState;
use waitlist_cell::router::waitlist_routes;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Waitlist engine API is running!" }))
        .nest("/waitlist", waitlist_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/match", match_routes(state.clone()))
}
