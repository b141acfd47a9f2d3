use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use shared_database::AppState;

use crate::handlers;

pub fn waitlist_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/patients", post(handlers::add_patient))
        .route("/patients", get(handlers::list_patients))
        .route("/patients/{waitlist_id}", get(handlers::get_patient))
        .route("/patients/{waitlist_id}", delete(handlers::remove_patient))
        .route("/patients/{waitlist_id}/grade", post(handlers::grade_patient))
        .route("/patients/{waitlist_id}/grade", patch(handlers::override_grade))
        .route("/grade-all", post(handlers::grade_all_patients))
        .route("/mark-seen", post(handlers::mark_seen))
        .with_state(state)
}
