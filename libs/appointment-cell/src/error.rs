use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Facility not found: {0}")]
    FacilityNotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),
}
