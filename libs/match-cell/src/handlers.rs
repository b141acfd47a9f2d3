use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::error::AppError;

use crate::error::MatchError;
use crate::models::{AssignSelectedRequest, Assignment};
use crate::services::assignment::AssignmentCoordinator;
use crate::services::rejection::RejectionService;

fn map_error(e: MatchError) -> AppError {
    match e {
        MatchError::AppointmentNotFound(id) => AppError::NotFound(format!("Appointment {}", id)),
        MatchError::Facility(msg) => AppError::NotFound(format!("Facility {}", msg)),
        MatchError::Validation(msg) => AppError::ValidationError(msg),
        MatchError::Store(msg) => AppError::Database(msg),
        MatchError::Ranking(msg) | MatchError::Routing(msg) => AppError::ExternalService(msg),
        MatchError::Serialization(e) => AppError::Internal(e.to_string()),
    }
}

fn coordinator(state: &Arc<AppState>) -> AssignmentCoordinator {
    AssignmentCoordinator::new(Arc::clone(&state.store), &state.config)
}

#[axum::debug_handler]
pub async fn automatic_assignment(State(state): State<Arc<AppState>>) -> Json<Value> {
    let summary = coordinator(&state).automatic_assignment().await;
    Json(json!({ "summary": summary }))
}

#[axum::debug_handler]
pub async fn assign_selected(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AssignSelectedRequest>,
) -> Json<Value> {
    let summary = coordinator(&state)
        .assign_selected(request.appointment_ids)
        .await;
    Json(json!({ "summary": summary }))
}

#[axum::debug_handler]
pub async fn manual_assign(
    State(state): State<Arc<AppState>>,
    Json(assignment): Json<Assignment>,
) -> Result<Json<Value>, AppError> {
    let committed = coordinator(&state)
        .manual_assign(assignment.clone())
        .await
        .map_err(map_error)?;

    if committed {
        Ok(Json(json!({
            "success": true,
            "appointment_id": assignment.appointment_id,
            "waitlist_id": assignment.waitlist_id,
        })))
    } else {
        Ok(Json(json!({
            "success": false,
            "message": "Appointment is not manually assignable",
        })))
    }
}

#[axum::debug_handler]
pub async fn reject_assignment(
    State(state): State<Arc<AppState>>,
    Json(assignment): Json<Assignment>,
) -> Result<Json<Value>, AppError> {
    let service = RejectionService::new(Arc::clone(&state.store));
    service
        .reject_assignment(&assignment)
        .await
        .map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn candidates_for_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let candidates = coordinator(&state)
        .candidates_for(appointment_id)
        .await
        .map_err(map_error)?;
    let count = candidates.len();
    Ok(Json(json!({ "results": candidates, "count": count })))
}

#[axum::debug_handler]
pub async fn reconcile_assignments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let repaired = coordinator(&state)
        .reconcile_assignments()
        .await
        .map_err(map_error)?;
    Ok(Json(json!({ "repaired": repaired })))
}
