use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use tracing::{info, instrument};
use urlencoding::encode;
use uuid::Uuid;

use shared_database::StoreClient;

use crate::error::AppointmentError;
use crate::models::{Appointment, AppointmentQueryParams, CreateAppointmentRequest, Hospital};

/// Read/write access to appointment slots and facility records. Holder
/// mutation is deliberately absent here; that belongs to the assignment
/// coordinator.
pub struct AppointmentService {
    store: Arc<StoreClient>,
}

impl AppointmentService {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = Appointment {
            appointment_id: Uuid::new_v4(),
            appointment_time: request.appointment_time,
            department_id: request.department_id,
            hospital_id: request.hospital_id,
            properties: request.properties,
            waitlist_id: None,
            assign_at: request.assign_at,
            assigner_email: None,
        };

        let body = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::Validation(e.to_string()))?;

        self.store
            .execute(Method::POST, "/rest/v1/appointments", Some(body))
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        info!("Created appointment {}", appointment.appointment_id);
        Ok(appointment)
    }

    /// Query future appointments with deterministic ordering (time, then id).
    #[instrument(skip(self, params))]
    pub async fn query_appointments(
        &self,
        params: &AppointmentQueryParams,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let now = Utc::now().to_rfc3339();
        let mut path = format!(
            "/rest/v1/appointments?appointment_time=gte.{}\
             &order=appointment_time.asc,appointment_id.asc",
            encode(&now)
        );

        if let Some(appointment_id) = params.appointment_id {
            path.push_str(&format!("&appointment_id=eq.{}", appointment_id));
        }
        if let Some(department_id) = params.department_id {
            path.push_str(&format!("&department_id=eq.{}", department_id));
        }
        if let Some(hospital_id) = params.hospital_id {
            path.push_str(&format!("&hospital_id=eq.{}", hospital_id));
        }
        if let Some(start_time) = params.start_time {
            path.push_str(&format!(
                "&appointment_time=gte.{}",
                encode(&start_time.to_rfc3339())
            ));
        }
        if let Some(end_time) = params.end_time {
            path.push_str(&format!(
                "&appointment_time=lte.{}",
                encode(&end_time.to_rfc3339())
            ));
        }
        if params.unassigned_only.unwrap_or(false) {
            path.push_str("&waitlist_id=is.null");
        }
        if params.auto_assignable.unwrap_or(false) {
            // Open for automatic assignment: hold window lapsed, or a slot
            // that never had one and has no holder yet.
            path.push_str(&format!(
                "&or=(assign_at.lte.{},and(waitlist_id.is.null,assign_at.is.null))",
                encode(&now)
            ));
        }

        self.store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?appointment_id=eq.{}", appointment_id);
        let mut rows: Vec<Appointment> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    /// Postcode of the facility hosting a slot; the proximity augmenter's
    /// destination.
    pub async fn hospital_postcode(&self, hospital_id: Uuid) -> Result<String, AppointmentError> {
        let path = format!(
            "/rest/v1/hospitals?select=hospital_id,postcode&hospital_id=eq.{}",
            hospital_id
        );
        let mut rows: Vec<Hospital> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        if rows.is_empty() {
            return Err(AppointmentError::FacilityNotFound(hospital_id));
        }
        Ok(rows.remove(0).postcode)
    }

    /// Point lookup used by reconciliation: rows where the appointment holds
    /// a patient whose own flag was lost to a partial commit.
    pub async fn appointments_with_holder(&self) -> Result<Vec<Appointment>, AppointmentError> {
        let path = "/rest/v1/appointments?waitlist_id=not.is.null";
        let rows: Vec<Value> = self
            .store
            .request(Method::GET, path, None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect())
    }
}
