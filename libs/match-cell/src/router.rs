use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_database::AppState;

use crate::handlers;

pub fn match_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/automatic", post(handlers::automatic_assignment))
        .route("/selected", post(handlers::assign_selected))
        .route("/assign", post(handlers::manual_assign))
        .route("/reject", post(handlers::reject_assignment))
        .route("/reconcile", post(handlers::reconcile_assignments))
        .route(
            "/candidates/{appointment_id}",
            get(handlers::candidates_for_appointment),
        )
        .with_state(state)
}
