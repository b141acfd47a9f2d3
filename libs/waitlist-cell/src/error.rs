use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum WaitlistError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Waitlist entry not found: {0}")]
    NotFound(Uuid),

    #[error("Scoring oracle error: {0}")]
    Oracle(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
