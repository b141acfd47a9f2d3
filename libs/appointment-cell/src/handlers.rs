use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::error::AppError;

use crate::error::AppointmentError;
use crate::models::{AppointmentQueryParams, CreateAppointmentRequest};
use crate::services::appointments::AppointmentService;

fn map_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound(id) => AppError::NotFound(format!("Appointment {}", id)),
        AppointmentError::FacilityNotFound(id) => AppError::NotFound(format!("Facility {}", id)),
        AppointmentError::Validation(msg) => AppError::ValidationError(msg),
        AppointmentError::Store(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(Arc::clone(&state.store));
    let appointment = service.create_appointment(request).await.map_err(map_error)?;
    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(Arc::clone(&state.store));
    let appointments = service.query_appointments(&params).await.map_err(map_error)?;
    let count = appointments.len();
    Ok(Json(json!({ "results": appointments, "count": count })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentService::new(Arc::clone(&state.store));
    let appointment = service
        .get_appointment(appointment_id)
        .await
        .map_err(map_error)?
        .ok_or_else(|| AppError::NotFound(format!("Appointment {}", appointment_id)))?;
    Ok(Json(json!({ "appointment": appointment })))
}
