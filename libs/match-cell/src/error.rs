use thiserror::Error;
use uuid::Uuid;

use appointment_cell::AppointmentError;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Facility lookup failed: {0}")]
    Facility(String),

    #[error("Ranking oracle error: {0}")]
    Ranking(String),

    #[error("Routing oracle error: {0}")]
    Routing(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AppointmentError> for MatchError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound(id) => MatchError::AppointmentNotFound(id),
            AppointmentError::FacilityNotFound(id) => MatchError::Facility(id.to_string()),
            AppointmentError::Store(msg) => MatchError::Store(msg),
            AppointmentError::Validation(msg) => MatchError::Validation(msg),
        }
    }
}
