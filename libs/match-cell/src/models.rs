use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use waitlist_cell::models::WaitlistEntry;

/// A waitlist entry moving through the assignment pipeline, progressively
/// annotated by the proximity and ranking stages.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub entry: WaitlistEntry,
    /// Driving distance to the hosting facility in metres. Only populated
    /// for imminent appointments; infinity marks an unreachable candidate.
    pub proximity_meters: Option<f64>,
    pub rank: Option<u32>,
    pub reasoning: Option<String>,
}

impl Candidate {
    pub fn from_entry(entry: WaitlistEntry) -> Self {
        Self {
            entry,
            proximity_meters: None,
            rank: None,
            reasoning: None,
        }
    }
}

/// One position returned by the ranking oracle.
#[derive(Debug, Clone, Deserialize)]
pub struct RankedCandidate {
    pub waitlist_id: Uuid,
    pub rank: u32,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub appointment_id: Uuid,
    pub waitlist_id: Uuid,
    #[serde(default)]
    pub assigner_email: Option<String>,
}

/// Outcome of a batch assignment run. The run itself never raises; slot
/// failures are tallied here and the last error surfaces in `message`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentSummary {
    pub successful: usize,
    pub failed: usize,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignSelectedRequest {
    pub appointment_ids: Vec<Uuid>,
}

/// Clinical priority order for candidate selection. Evening-preference
/// direction follows the clinic's local hour at selection time; graded
/// scores beat ungraded ones, older referrals beat newer ones, and the id
/// is the final tiebreak so the order is total and reproducible.
pub fn priority_order(a: &WaitlistEntry, b: &WaitlistEntry, evening_first: bool) -> Ordering {
    let evening = if evening_first {
        b.prefers_evening.cmp(&a.prefers_evening)
    } else {
        a.prefers_evening.cmp(&b.prefers_evening)
    };

    evening
        .then_with(|| {
            b.clinical_urgency
                .unwrap_or(i32::MIN)
                .cmp(&a.clinical_urgency.unwrap_or(i32::MIN))
        })
        .then_with(|| {
            b.condition_severity
                .unwrap_or(i32::MIN)
                .cmp(&a.condition_severity.unwrap_or(i32::MIN))
        })
        .then_with(|| {
            b.comorbidities
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.comorbidities.unwrap_or(f64::NEG_INFINITY))
        })
        .then_with(|| a.referral_date.cmp(&b.referral_date))
        .then_with(|| a.waitlist_id.cmp(&b.waitlist_id))
}

/// Candidate payload shipped to the ranking oracle: identity, stated
/// preferences and (when computed) proximity. Clinical scores stay out;
/// they were already spent during selection.
pub fn ranking_payload(candidate: &Candidate) -> Value {
    serde_json::json!({
        "waitlist_id": candidate.entry.waitlist_id,
        "preferences": candidate.entry.preferences,
        "proximity": candidate.proximity_meters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn entry(
        id: &str,
        urgency: Option<i32>,
        severity: Option<i32>,
        comorbidities: Option<f64>,
        referral_date: DateTime<Utc>,
        prefers_evening: bool,
    ) -> WaitlistEntry {
        WaitlistEntry {
            waitlist_id: Uuid::parse_str(id).unwrap(),
            medical_number: "MN1".into(),
            referral_date,
            date_of_birth: None,
            postcode: None,
            department_id: Uuid::nil(),
            referral_notes: None,
            medical_history: None,
            clinical_urgency: urgency,
            condition_severity: severity,
            comorbidities,
            grading_justification: None,
            grading_status: None,
            graded_at: None,
            edited_at: None,
            is_seen: false,
            is_assigned: false,
            preferences: None,
            prefers_evening,
            deleted_at: None,
        }
    }

    const ID_LOW: &str = "00000000-0000-0000-0000-000000000001";
    const ID_HIGH: &str = "00000000-0000-0000-0000-000000000002";

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn higher_urgency_sorts_first() {
        let a = entry(ID_LOW, Some(3), Some(1), Some(0.1), date(1), false);
        let b = entry(ID_HIGH, Some(8), Some(1), Some(0.1), date(1), false);
        assert_eq!(priority_order(&a, &b, false), Ordering::Greater);
    }

    #[test]
    fn ungraded_sorts_below_graded() {
        let graded = entry(ID_LOW, Some(1), Some(1), Some(0.0), date(1), false);
        let ungraded = entry(ID_HIGH, None, None, None, date(1), false);
        assert_eq!(priority_order(&graded, &ungraded, false), Ordering::Less);
    }

    #[test]
    fn older_referral_wins_on_equal_scores() {
        let older = entry(ID_HIGH, Some(5), Some(5), Some(1.0), date(1), false);
        let newer = entry(ID_LOW, Some(5), Some(5), Some(1.0), date(20), false);
        assert_eq!(priority_order(&older, &newer, false), Ordering::Less);
    }

    #[test]
    fn identical_entries_break_ties_on_id() {
        let a = entry(ID_LOW, Some(5), Some(5), Some(1.0), date(1), false);
        let b = entry(ID_HIGH, Some(5), Some(5), Some(1.0), date(1), false);
        assert_eq!(priority_order(&a, &b, false), Ordering::Less);
        assert_eq!(priority_order(&b, &a, false), Ordering::Greater);
        assert_eq!(priority_order(&a, &a, false), Ordering::Equal);
    }

    #[test]
    fn evening_direction_flips_with_flag() {
        let evening = entry(ID_LOW, Some(5), Some(5), Some(1.0), date(1), true);
        let daytime = entry(ID_HIGH, Some(5), Some(5), Some(1.0), date(1), false);

        assert_eq!(priority_order(&evening, &daytime, true), Ordering::Less);
        assert_eq!(priority_order(&evening, &daytime, false), Ordering::Greater);
    }

    #[test]
    fn sort_is_deterministic_regardless_of_input_order() {
        let a = entry(ID_LOW, Some(5), None, Some(1.0), date(1), false);
        let b = entry(ID_HIGH, Some(5), Some(2), Some(1.0), date(1), false);
        let c = entry("00000000-0000-0000-0000-000000000003", Some(7), None, None, date(3), false);

        let mut forward = vec![a.clone(), b.clone(), c.clone()];
        let mut backward = vec![c, b, a];
        forward.sort_by(|x, y| priority_order(x, y, false));
        backward.sort_by(|x, y| priority_order(x, y, false));

        let ids: Vec<Uuid> = forward.iter().map(|e| e.waitlist_id).collect();
        let rev_ids: Vec<Uuid> = backward.iter().map(|e| e.waitlist_id).collect();
        assert_eq!(ids, rev_ids);
    }
}
