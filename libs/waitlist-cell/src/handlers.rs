use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::error::AppError;

use crate::error::WaitlistError;
use crate::models::{AddPatientRequest, GradeOverrideRequest, WaitlistQueryParams};
use crate::services::grading::GradingOrchestrator;
use crate::services::waitlist::WaitlistService;

fn map_error(e: WaitlistError) -> AppError {
    match e {
        WaitlistError::NotFound(id) => AppError::NotFound(format!("Waitlist entry {}", id)),
        WaitlistError::Validation(msg) => AppError::ValidationError(msg),
        WaitlistError::Oracle(msg) => AppError::ExternalService(msg),
        WaitlistError::Store(msg) => AppError::Database(msg),
        WaitlistError::Serialization(e) => AppError::Internal(e.to_string()),
    }
}

#[axum::debug_handler]
pub async fn add_patient(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddPatientRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WaitlistService::new(Arc::clone(&state.store));
    let entry = service.add_patient(request).await.map_err(map_error)?;
    Ok(Json(json!({ "entry": entry })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    Path(waitlist_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = WaitlistService::new(Arc::clone(&state.store));
    let entry = service
        .get_patient(waitlist_id)
        .await
        .map_err(map_error)?
        .ok_or_else(|| AppError::NotFound(format!("Waitlist entry {}", waitlist_id)))?;
    Ok(Json(json!({ "entry": entry })))
}

#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WaitlistQueryParams>,
) -> Result<Json<Value>, AppError> {
    let service = WaitlistService::new(Arc::clone(&state.store));
    let entries = service.list_patients(params).await.map_err(map_error)?;
    let count = entries.len();
    Ok(Json(json!({ "results": entries, "count": count })))
}

#[axum::debug_handler]
pub async fn remove_patient(
    State(state): State<Arc<AppState>>,
    Path(waitlist_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = WaitlistService::new(Arc::clone(&state.store));
    service.remove_patient(waitlist_id).await.map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn grade_patient(
    State(state): State<Arc<AppState>>,
    Path(waitlist_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let orchestrator = GradingOrchestrator::new(Arc::clone(&state.store), &state.config);
    let entry = orchestrator.grade_entry(waitlist_id).await.map_err(map_error)?;
    Ok(Json(json!({ "entry": entry })))
}

#[axum::debug_handler]
pub async fn grade_all_patients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let orchestrator = GradingOrchestrator::new(Arc::clone(&state.store), &state.config);
    let summary = orchestrator.grade_all().await;
    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn override_grade(
    State(state): State<Arc<AppState>>,
    Path(waitlist_id): Path<Uuid>,
    Json(request): Json<GradeOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    let service = WaitlistService::new(Arc::clone(&state.store));
    let entry = service
        .override_grade(waitlist_id, request)
        .await
        .map_err(map_error)?
        .ok_or_else(|| AppError::NotFound(format!("Waitlist entry {}", waitlist_id)))?;
    Ok(Json(json!({ "entry": entry })))
}

#[axum::debug_handler]
pub async fn mark_seen(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let service = WaitlistService::new(Arc::clone(&state.store));
    let marked = service.mark_seen().await.map_err(map_error)?;
    Ok(Json(json!({ "success": true, "marked": marked })))
}
