use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

use shared_utils::time::staleness_cutoff;

// ==============================================================================
// CORE WAITLIST MODELS
// ==============================================================================

/// Grading lifecycle. `Ungraded` is represented as a null status in the
/// store, so the entry carries `Option<GradingStatus>`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GradingStatus {
    Grading,
    Completed,
    Failed,
}

impl fmt::Display for GradingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradingStatus::Grading => write!(f, "GRADING"),
            GradingStatus::Completed => write!(f, "COMPLETED"),
            GradingStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One prior referral episode rolled into a patient's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryNote {
    pub date: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub waitlist_id: Uuid,
    pub medical_number: String,
    pub referral_date: DateTime<Utc>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    pub department_id: Uuid,
    #[serde(default)]
    pub referral_notes: Option<String>,
    #[serde(default)]
    pub medical_history: Option<Vec<HistoryNote>>,
    #[serde(default)]
    pub clinical_urgency: Option<i32>,
    #[serde(default)]
    pub condition_severity: Option<i32>,
    #[serde(default)]
    pub comorbidities: Option<f64>,
    #[serde(default)]
    pub grading_justification: Option<String>,
    #[serde(default)]
    pub grading_status: Option<GradingStatus>,
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
    /// Stamp of the last manual grade override; cleared when the oracle
    /// re-grades the entry.
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_seen: bool,
    #[serde(default)]
    pub is_assigned: bool,
    #[serde(default)]
    pub preferences: Option<Value>,
    #[serde(default)]
    pub prefers_evening: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WaitlistEntry {
    /// An entry may be (re-)graded when it has never completed grading,
    /// failed its last attempt, or has been stuck in GRADING beyond the
    /// staleness window. Seen and soft-deleted entries never qualify.
    pub fn eligible_for_grading(&self, now: DateTime<Utc>, staleness_hours: i64) -> bool {
        if self.is_seen || self.deleted_at.is_some() {
            return false;
        }

        match self.grading_status {
            None | Some(GradingStatus::Failed) => true,
            Some(GradingStatus::Completed) => false,
            Some(GradingStatus::Grading) => match self.graded_at {
                Some(stamped) => stamped <= staleness_cutoff(now, staleness_hours),
                // GRADING without a stamp is an abandoned lock
                None => true,
            },
        }
    }

    /// Clinical fields shipped to the scoring oracle.
    pub fn grading_payload(&self) -> Value {
        json!({
            "date_of_birth": self.date_of_birth,
            "department_id": self.department_id,
            "referral_notes": self.referral_notes,
            "referral_date": self.referral_date,
            "medical_history": self.medical_history,
        })
    }
}

// ==============================================================================
// GRADING MODELS
// ==============================================================================

/// What the scoring oracle produced for one entry. Any field may be absent
/// when the corresponding grader returned nothing usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradingOutcome {
    pub clinical_urgency: Option<i32>,
    pub condition_severity: Option<i32>,
    pub comorbidities: Option<f64>,
    pub justification: Option<String>,
}

/// Aggregate result of a grade-all run. Batch grading never raises; partial
/// failure is reported here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GradingSummary {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AddPatientRequest {
    pub medical_number: String,
    pub referral_date: DateTime<Utc>,
    pub date_of_birth: Option<String>,
    pub postcode: Option<String>,
    pub referral_department: Uuid,
    pub referral_notes: Option<String>,
    pub medical_history: Option<Vec<HistoryNote>>,
    pub preferences: Option<Value>,
    pub prefers_evening: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradeOverrideRequest {
    pub clinical_urgency: i32,
    pub condition_severity: i32,
    pub comorbidities: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitlistQueryParams {
    pub department_id: Option<Uuid>,
    pub medical_number: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
