use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, instrument};
use urlencoding::encode;
use uuid::Uuid;

use shared_database::StoreClient;
use shared_utils::time::weeks_ago;
use waitlist_cell::models::WaitlistEntry;

use crate::error::MatchError;
use crate::models::priority_order;

/// Waiting-time tiers tried in order: patients waiting at least ten weeks,
/// then at least four, then the whole department backlog. Each tier is a
/// superset of the previous one, so the pool only ever widens and the
/// longest waiters are served first.
const TIER_WEEKS: [Option<i64>; 3] = [Some(10), Some(4), None];

#[derive(Deserialize)]
struct RejectedRow {
    waitlist_id: Uuid,
}

/// Picks the top candidates for a slot. Filtering happens in the store;
/// ordering and truncation happen here so the priority rules live in one
/// testable place.
pub struct CandidateSelector {
    store: Arc<StoreClient>,
}

impl CandidateSelector {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Top `limit` candidates for the slot, in priority order. Tiers are
    /// exhausted one by one; the first non-empty pool wins.
    #[instrument(skip(self, now))]
    pub async fn select(
        &self,
        appointment_id: Uuid,
        department_id: Uuid,
        limit: usize,
        evening_first: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<WaitlistEntry>, MatchError> {
        let rejected = self.rejected_ids(appointment_id).await?;

        for weeks in TIER_WEEKS {
            let waiting_since = weeks.map(|w| weeks_ago(now, w));
            let mut pool = self
                .candidate_pool(department_id, &rejected, waiting_since)
                .await?;

            if pool.is_empty() {
                debug!(
                    "No candidates for appointment {} in tier {:?}",
                    appointment_id, weeks
                );
                continue;
            }

            pool.sort_by(|a, b| priority_order(a, b, evening_first));
            pool.truncate(limit);
            return Ok(pool);
        }

        Ok(Vec::new())
    }

    /// Patients who already declined this slot; they never come back as
    /// candidates for it.
    async fn rejected_ids(&self, appointment_id: Uuid) -> Result<Vec<Uuid>, MatchError> {
        let path = format!(
            "/rest/v1/rejected_appointments?select=waitlist_id&appointment_id=eq.{}",
            appointment_id
        );
        let rows: Vec<RejectedRow> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.waitlist_id).collect())
    }

    /// One tier's pool: patients referred on or before the cutoff, i.e.
    /// waiting at least that long. No cutoff means the whole backlog.
    async fn candidate_pool(
        &self,
        department_id: Uuid,
        rejected: &[Uuid],
        waiting_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WaitlistEntry>, MatchError> {
        let mut path = format!(
            "/rest/v1/waitlist?department_id=eq.{}\
             &is_assigned=is.false&is_seen=is.false&deleted_at=is.null",
            department_id
        );

        if !rejected.is_empty() {
            let ids: Vec<String> = rejected.iter().map(Uuid::to_string).collect();
            path.push_str(&format!("&waitlist_id=not.in.({})", ids.join(",")));
        }
        if let Some(cutoff) = waiting_since {
            path.push_str(&format!(
                "&referral_date=lte.{}",
                encode(&cutoff.to_rfc3339())
            ));
        }

        self.store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| MatchError::Store(e.to_string()))
    }
}
