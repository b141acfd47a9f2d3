use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One bookable slot. The holder reference and `assign_at` are mutually
/// exclusive outside the hold window; only the assignment coordinator may
/// mutate either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub department_id: Uuid,
    pub hospital_id: Uuid,
    /// Free-form slot attributes consumed by the preference ranker
    /// (gender/language/accessibility tags and the like).
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default)]
    pub waitlist_id: Option<Uuid>,
    /// While set to a future time the slot is reserved for manual
    /// assignment; null or past means open for automatic assignment.
    #[serde(default)]
    pub assign_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigner_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    pub appointment_time: DateTime<Utc>,
    pub department_id: Uuid,
    pub hospital_id: Uuid,
    pub properties: Option<Value>,
    pub assign_at: Option<DateTime<Utc>>,
}

/// Filters for slot queries. Only future appointments are ever returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentQueryParams {
    pub appointment_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub hospital_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Restrict to slots with no holder.
    pub unassigned_only: Option<bool>,
    /// Restrict to slots whose hold window has lapsed (or never existed).
    pub auto_assignable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospital {
    pub hospital_id: Uuid,
    pub postcode: String,
}
