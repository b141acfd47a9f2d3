use std::sync::Arc;

use reqwest::Method;
use serde_json::json;
use tracing::{info, instrument};

use shared_database::StoreClient;

use crate::error::MatchError;
use crate::models::Assignment;

/// Handles a patient declining an offered slot. The write order matters:
/// the patient is freed before the slot, and the rejection record lands
/// last so a partial failure never blocks the patient from other slots.
pub struct RejectionService {
    store: Arc<StoreClient>,
}

impl RejectionService {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn reject_assignment(&self, assignment: &Assignment) -> Result<(), MatchError> {
        let patient_path = format!(
            "/rest/v1/waitlist?waitlist_id=eq.{}",
            assignment.waitlist_id
        );
        self.store
            .execute(Method::PATCH, &patient_path, Some(json!({ "is_assigned": false })))
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        let slot_path = format!(
            "/rest/v1/appointments?appointment_id=eq.{}",
            assignment.appointment_id
        );
        self.store
            .execute(
                Method::PATCH,
                &slot_path,
                Some(json!({ "waitlist_id": null, "assigner_email": null })),
            )
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        self.store
            .execute(
                Method::POST,
                "/rest/v1/rejected_appointments",
                Some(json!({
                    "appointment_id": assignment.appointment_id,
                    "waitlist_id": assignment.waitlist_id,
                })),
            )
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        info!(
            "Recorded rejection of appointment {} by waitlist entry {}",
            assignment.appointment_id, assignment.waitlist_id
        );
        Ok(())
    }
}
