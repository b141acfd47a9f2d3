use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use urlencoding::encode;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::StoreClient;
use shared_utils::time::staleness_cutoff;

use crate::error::WaitlistError;
use crate::models::{GradingOutcome, GradingStatus, GradingSummary, WaitlistEntry};
use crate::services::scoring::{AgentScoringClient, ScoringOracle};

/// Drives the per-entry grading state machine. The only component allowed to
/// move `grading_status`; assignment state is owned elsewhere.
pub struct GradingOrchestrator {
    store: Arc<StoreClient>,
    oracle: Arc<dyn ScoringOracle>,
    concurrency: usize,
    staleness_hours: i64,
}

impl GradingOrchestrator {
    pub fn new(store: Arc<StoreClient>, config: &AppConfig) -> Self {
        Self {
            store,
            oracle: Arc::new(AgentScoringClient::new(config)),
            concurrency: config.grading_concurrency,
            staleness_hours: config.grading_staleness_hours,
        }
    }

    pub fn with_oracle(
        store: Arc<StoreClient>,
        oracle: Arc<dyn ScoringOracle>,
        concurrency: usize,
        staleness_hours: i64,
    ) -> Self {
        Self {
            store,
            oracle,
            concurrency,
            staleness_hours,
        }
    }

    /// Grade a single entry and hand back its post-grading record. An oracle
    /// failure leaves the entry FAILED and still returns the record; only
    /// store failures propagate.
    #[instrument(skip(self))]
    pub async fn grade_entry(&self, waitlist_id: Uuid) -> Result<WaitlistEntry, WaitlistError> {
        match self.run_grading(waitlist_id).await {
            Ok(()) => {}
            Err(WaitlistError::Oracle(msg)) => {
                warn!("Grading of {} failed at the oracle: {}", waitlist_id, msg);
            }
            Err(other) => return Err(other),
        }

        self.fetch_entry(waitlist_id)
            .await?
            .ok_or(WaitlistError::NotFound(waitlist_id))
    }

    /// Grade every eligible entry with at most `concurrency` simultaneous
    /// oracle sessions. One entry's failure never aborts its siblings; the
    /// summary carries per-entry error messages.
    #[instrument(skip(self))]
    pub async fn grade_all(&self) -> GradingSummary {
        let ids = match self.eligible_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                return GradingSummary {
                    errors: vec![format!("Failed to query eligible entries: {}", e)],
                    ..GradingSummary::default()
                }
            }
        };

        info!("Grading {} eligible waitlist entries", ids.len());

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let tasks = ids.iter().map(|id| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = semaphore.acquire().await.ok();
                (*id, self.run_grading(*id).await)
            }
        });

        let mut summary = GradingSummary {
            total_processed: ids.len(),
            ..GradingSummary::default()
        };

        for (id, outcome) in join_all(tasks).await {
            match outcome {
                Ok(()) => summary.successful += 1,
                Err(e) => {
                    summary.failed += 1;
                    summary.errors.push(format!("Failed to grade patient {}: {}", id, e));
                }
            }
        }

        summary
    }

    /// Entries the next grading run should pick up: never completed, failed,
    /// or holding a stale GRADING lock.
    pub async fn eligible_ids(&self) -> Result<Vec<Uuid>, WaitlistError> {
        let cutoff = staleness_cutoff(Utc::now(), self.staleness_hours).to_rfc3339();
        let path = format!(
            "/rest/v1/waitlist?select=waitlist_id\
             &is_seen=is.false&deleted_at=is.null\
             &or=(grading_status.is.null,grading_status.eq.FAILED,\
             and(grading_status.eq.GRADING,graded_at.lte.{}))",
            encode(&cutoff)
        );

        let rows: Vec<Value> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get("waitlist_id"))
            .filter_map(|id| serde_json::from_value(id.clone()).ok())
            .collect())
    }

    async fn run_grading(&self, waitlist_id: Uuid) -> Result<(), WaitlistError> {
        let entry = self
            .fetch_active_entry(waitlist_id)
            .await?
            .ok_or(WaitlistError::NotFound(waitlist_id))?;

        // A concurrent run may have taken the GRADING lock between the
        // eligibility query and this fetch; a fresh lock is left alone.
        if entry.grading_status == Some(GradingStatus::Grading)
            && !entry.eligible_for_grading(Utc::now(), self.staleness_hours)
        {
            return Err(WaitlistError::Validation(format!(
                "waitlist entry {} is already being graded",
                waitlist_id
            )));
        }

        self.set_status(waitlist_id, GradingStatus::Grading).await?;

        match self.oracle.grade(waitlist_id, entry.grading_payload()).await {
            Ok(outcome) => self.save_outcome(waitlist_id, &outcome).await,
            Err(e) => {
                self.set_status(waitlist_id, GradingStatus::Failed).await?;
                Err(e)
            }
        }
    }

    async fn fetch_entry(&self, waitlist_id: Uuid) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let path = format!("/rest/v1/waitlist?waitlist_id=eq.{}", waitlist_id);
        let mut rows: Vec<WaitlistEntry> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    async fn fetch_active_entry(
        &self,
        waitlist_id: Uuid,
    ) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let path = format!(
            "/rest/v1/waitlist?waitlist_id=eq.{}&is_seen=is.false&deleted_at=is.null",
            waitlist_id
        );
        let mut rows: Vec<WaitlistEntry> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))?;

        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    async fn set_status(
        &self,
        waitlist_id: Uuid,
        status: GradingStatus,
    ) -> Result<(), WaitlistError> {
        let path = format!("/rest/v1/waitlist?waitlist_id=eq.{}", waitlist_id);
        let body = json!({
            "grading_status": status,
            "graded_at": Utc::now(),
        });

        self.store
            .execute(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))
    }

    async fn save_outcome(
        &self,
        waitlist_id: Uuid,
        outcome: &GradingOutcome,
    ) -> Result<(), WaitlistError> {
        let path = format!("/rest/v1/waitlist?waitlist_id=eq.{}", waitlist_id);
        let body = json!({
            "clinical_urgency": outcome.clinical_urgency,
            "condition_severity": outcome.condition_severity,
            "comorbidities": outcome.comorbidities,
            "grading_justification": outcome.justification,
            "grading_status": GradingStatus::Completed,
            "graded_at": Utc::now(),
            "edited_at": Value::Null,
        });

        self.store
            .execute(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| WaitlistError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scoring::MockScoringOracle;
    use wiremock::matchers::{method, path, query_param_contains};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> Arc<StoreClient> {
        let config = AppConfig {
            store_url: server.uri(),
            store_service_key: "test-key".into(),
            scoring_agent_url: String::new(),
            ranking_agent_url: String::new(),
            routes_api_url: String::new(),
            routes_api_key: String::new(),
            grading_concurrency: 2,
            grading_staleness_hours: 1,
            candidate_limit: 5,
            clinic_utc_offset_hours: 0,
        };
        Arc::new(StoreClient::new(&config))
    }

    fn entry_row(id: Uuid) -> Value {
        json!({
            "waitlist_id": id,
            "medical_number": "MN001",
            "referral_date": "2025-06-01T09:00:00Z",
            "department_id": Uuid::new_v4(),
            "is_seen": false,
            "is_assigned": false,
            "prefers_evening": false,
        })
    }

    #[tokio::test]
    async fn oracle_failure_marks_entry_failed_but_batch_continues() {
        let server = MockServer::start().await;
        let id_ok = Uuid::new_v4();
        let id_bad = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/waitlist"))
            .and(query_param_contains("select", "waitlist_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "waitlist_id": id_ok },
                { "waitlist_id": id_bad },
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/waitlist"))
            .and(query_param_contains("waitlist_id", id_ok.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([entry_row(id_ok)])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/waitlist"))
            .and(query_param_contains("waitlist_id", id_bad.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([entry_row(id_bad)])))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/waitlist"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut oracle = MockScoringOracle::new();
        oracle
            .expect_grade()
            .withf(move |id, _| *id == id_ok)
            .returning(|_, _| {
                Ok(GradingOutcome {
                    clinical_urgency: Some(2),
                    condition_severity: Some(1),
                    comorbidities: Some(0.1),
                    justification: Some("Stable.".into()),
                })
            });
        oracle
            .expect_grade()
            .withf(move |id, _| *id == id_bad)
            .returning(|_, _| Err(WaitlistError::Oracle("agent unreachable".into())));

        let orchestrator =
            GradingOrchestrator::with_oracle(store_for(&server), Arc::new(oracle), 2, 1);

        let summary = orchestrator.grade_all().await;
        assert_eq!(summary.total_processed, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains(&id_bad.to_string()));
    }

    #[tokio::test]
    async fn fresh_grading_lock_is_not_regraded() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        let mut row = entry_row(id);
        row["grading_status"] = json!("GRADING");
        row["graded_at"] = json!(Utc::now());

        Mock::given(method("GET"))
            .and(path("/rest/v1/waitlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/waitlist"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        // No grade expectation: any oracle call would fail the test.
        let orchestrator = GradingOrchestrator::with_oracle(
            store_for(&server),
            Arc::new(MockScoringOracle::new()),
            2,
            1,
        );

        let result = orchestrator.grade_entry(id).await;
        assert!(matches!(result, Err(WaitlistError::Validation(_))));
    }

    #[tokio::test]
    async fn grade_all_survives_eligibility_query_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/waitlist"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let orchestrator = GradingOrchestrator::with_oracle(
            store_for(&server),
            Arc::new(MockScoringOracle::new()),
            2,
            1,
        );

        let summary = orchestrator.grade_all().await;
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.errors.len(), 1);
    }
}
