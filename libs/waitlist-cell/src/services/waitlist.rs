use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, instrument};
use urlencoding::encode;
use uuid::Uuid;

use shared_database::StoreClient;

use crate::error::WaitlistError;
use crate::models::{
    AddPatientRequest, GradeOverrideRequest, HistoryNote, WaitlistEntry, WaitlistQueryParams,
};

const COMORBIDITY_TOLERANCE: f64 = 1e-3;

/// Intake and record-keeping for waitlist entries. Grading state belongs to
/// the orchestrator and assignment state to the coordinator; this service
/// touches neither.
pub struct WaitlistService {
    store: Arc<StoreClient>,
}

impl WaitlistService {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Register a referral. A returning medical number rolls the previous
    /// referral's notes into the top of the new entry's history and inherits
    /// demographics the request leaves blank.
    #[instrument(skip(self, request), fields(medical_number = %request.medical_number))]
    pub async fn add_patient(
        &self,
        request: AddPatientRequest,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let previous = self.latest_entry_for(&request.medical_number).await?;

        let mut medical_history = request.medical_history.clone().unwrap_or_default();
        let mut date_of_birth = request.date_of_birth.clone();
        let mut postcode = request.postcode.clone();

        if let Some(last) = previous {
            let mut rolled = last.medical_history.unwrap_or_default();
            if let Some(notes) = last.referral_notes {
                rolled.insert(
                    0,
                    HistoryNote {
                        date: last.referral_date.format("%Y-%m-%d").to_string(),
                        notes,
                    },
                );
            }
            medical_history = rolled;
            date_of_birth = date_of_birth.or(last.date_of_birth);
            postcode = postcode.or(last.postcode);
        }

        let entry = WaitlistEntry {
            waitlist_id: Uuid::new_v4(),
            medical_number: request.medical_number,
            referral_date: request.referral_date,
            date_of_birth,
            postcode,
            department_id: request.referral_department,
            referral_notes: request.referral_notes,
            medical_history: if medical_history.is_empty() {
                None
            } else {
                Some(medical_history)
            },
            clinical_urgency: None,
            condition_severity: None,
            comorbidities: None,
            grading_justification: None,
            grading_status: None,
            graded_at: None,
            edited_at: None,
            is_seen: false,
            is_assigned: false,
            preferences: request.preferences,
            prefers_evening: request.prefers_evening.unwrap_or(false),
            deleted_at: None,
        };

        self.store
            .execute(
                Method::POST,
                "/rest/v1/waitlist",
                Some(serde_json::to_value(&entry)?),
            )
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        info!("Added waitlist entry {}", entry.waitlist_id);
        Ok(entry)
    }

    /// Manual grade override. No-op when the requested values already match
    /// the record; otherwise stamps `edited_at` so a later oracle run can
    /// tell the grades were touched by hand.
    pub async fn override_grade(
        &self,
        waitlist_id: Uuid,
        request: GradeOverrideRequest,
    ) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let Some(current) = self.get_patient(waitlist_id).await? else {
            return Ok(None);
        };

        let unchanged = current.clinical_urgency == Some(request.clinical_urgency)
            && current.condition_severity == Some(request.condition_severity)
            && (current.comorbidities.unwrap_or(0.0) - request.comorbidities).abs()
                < COMORBIDITY_TOLERANCE;

        if unchanged {
            return Ok(Some(current));
        }

        let path = format!("/rest/v1/waitlist?waitlist_id=eq.{}", waitlist_id);
        let body = json!({
            "clinical_urgency": request.clinical_urgency,
            "condition_severity": request.condition_severity,
            "comorbidities": request.comorbidities,
            "edited_at": Utc::now(),
        });

        self.store
            .execute(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        self.get_patient(waitlist_id).await
    }

    /// Flag every entry whose assigned appointment time has passed; seen
    /// entries leave the matching pool for good.
    pub async fn mark_seen(&self) -> Result<usize, WaitlistError> {
        let now = Utc::now().to_rfc3339();
        let path = format!(
            "/rest/v1/appointments?select=waitlist_id&appointment_time=lt.{}&waitlist_id=not.is.null",
            encode(&now)
        );

        let rows: Vec<Value> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        let ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("waitlist_id"))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let path = format!(
            "/rest/v1/waitlist?waitlist_id=in.({})&is_seen=is.false",
            ids.join(",")
        );
        self.store
            .execute(Method::PATCH, &path, Some(json!({ "is_seen": true })))
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        info!("Marked {} waitlist entries as seen", ids.len());
        Ok(ids.len())
    }

    pub async fn get_patient(
        &self,
        waitlist_id: Uuid,
    ) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let path = format!("/rest/v1/waitlist?waitlist_id=eq.{}&deleted_at=is.null", waitlist_id);
        let mut rows: Vec<WaitlistEntry> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    pub async fn list_patients(
        &self,
        params: WaitlistQueryParams,
    ) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let mut path = String::from(
            "/rest/v1/waitlist?is_seen=is.false&deleted_at=is.null\
             &order=clinical_urgency.desc.nullslast,condition_severity.desc.nullslast,\
             comorbidities.desc.nullslast,referral_date.asc,waitlist_id.asc",
        );

        if let Some(department_id) = params.department_id {
            path.push_str(&format!("&department_id=eq.{}", department_id));
        }
        if let Some(ref medical_number) = params.medical_number {
            path.push_str(&format!("&medical_number=like.*{}*", encode(medical_number)));
        }
        path.push_str(&format!("&limit={}", params.limit.unwrap_or(20)));
        path.push_str(&format!("&offset={}", params.offset.unwrap_or(0)));

        self.store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))
    }

    /// Soft delete; the entry stays queryable for audit but leaves matching.
    pub async fn remove_patient(&self, waitlist_id: Uuid) -> Result<(), WaitlistError> {
        let path = format!("/rest/v1/waitlist?waitlist_id=eq.{}", waitlist_id);
        self.store
            .execute(Method::PATCH, &path, Some(json!({ "deleted_at": Utc::now() })))
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))
    }

    async fn latest_entry_for(
        &self,
        medical_number: &str,
    ) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let path = format!(
            "/rest/v1/waitlist?medical_number=eq.{}&order=referral_date.desc&limit=1",
            encode(medical_number)
        );
        let mut rows: Vec<WaitlistEntry> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }
}
