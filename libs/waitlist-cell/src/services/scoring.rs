use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::WaitlistError;
use crate::models::GradingOutcome;

/// Grader names the scoring oracle reports its verdicts under, in the order
/// their justifications are concatenated.
const GRADERS: [&str; 3] = ["urgency_grader", "condition_grader", "comorbidities_grader"];

/// Seam for the external clinical scoring service. The engine treats it as a
/// black box returning independent scores plus free-text justifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn grade(&self, waitlist_id: Uuid, patient: Value)
        -> Result<GradingOutcome, WaitlistError>;
}

/// HTTP client for the remote grading agent. Each invocation runs inside an
/// ephemeral session: create, query, tear down. The session identity never
/// leaks into the domain model.
pub struct AgentScoringClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, serde::Deserialize)]
struct SessionHandle {
    session_id: String,
}

impl AgentScoringClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.scoring_agent_url.clone(),
        }
    }

    async fn create_session(&self, user: &str) -> Result<SessionHandle, WaitlistError> {
        let url = format!("{}/v1/sessions", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "user_id": user }))
            .send()
            .await
            .map_err(|e| WaitlistError::Oracle(format!("session creation failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WaitlistError::Oracle(format!(
                "session creation failed: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<SessionHandle>()
            .await
            .map_err(|e| WaitlistError::Oracle(format!("malformed session response: {}", e)))
    }

    async fn query_session(
        &self,
        session: &SessionHandle,
        patient: &Value,
    ) -> Result<Value, WaitlistError> {
        let url = format!("{}/v1/sessions/{}/query", self.base_url, session.session_id);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "message": patient }))
            .send()
            .await
            .map_err(|e| WaitlistError::Oracle(format!("grading query failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WaitlistError::Oracle(format!(
                "grading query failed: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| WaitlistError::Oracle(format!("malformed grading response: {}", e)))
    }

    async fn delete_session(&self, session: &SessionHandle) {
        let url = format!("{}/v1/sessions/{}", self.base_url, session.session_id);

        // Teardown is best-effort; a leaked session must not mask the
        // grading result.
        if let Err(e) = self.client.delete(&url).send().await {
            warn!("Failed to tear down scoring session {}: {}", session.session_id, e);
        }
    }
}

#[async_trait]
impl ScoringOracle for AgentScoringClient {
    async fn grade(
        &self,
        waitlist_id: Uuid,
        patient: Value,
    ) -> Result<GradingOutcome, WaitlistError> {
        let user = format!("u_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let session = self.create_session(&user).await?;

        info!(
            "Started grading session {} for waitlist entry {}",
            session.session_id, waitlist_id
        );

        let result = self.query_session(&session, &patient).await;
        self.delete_session(&session).await;

        debug!(
            "Ended grading session {} for waitlist entry {}",
            session.session_id, waitlist_id
        );

        let response = result?;
        Ok(outcome_from_response(&response))
    }
}

/// Pull the three grader verdicts out of an oracle response. Absent or
/// malformed verdicts leave the matching field null rather than failing the
/// whole grading.
pub fn outcome_from_response(response: &Value) -> GradingOutcome {
    let verdicts = response
        .get("verdicts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let verdict_for = |grader: &str| {
        verdicts
            .iter()
            .find(|v| v.get("grader").and_then(Value::as_str) == Some(grader))
    };

    let score_for = |grader: &str| verdict_for(grader)?.get("score")?.as_f64();

    let mut justifications = Vec::new();
    for grader in GRADERS {
        if let Some(text) = verdict_for(grader)
            .and_then(|v| v.get("justification"))
            .and_then(Value::as_str)
        {
            if !text.trim().is_empty() {
                justifications.push(text.trim().to_string());
            }
        }
    }

    GradingOutcome {
        clinical_urgency: score_for("urgency_grader").map(|s| s.round() as i32),
        condition_severity: score_for("condition_grader").map(|s| s.round() as i32),
        comorbidities: score_for("comorbidities_grader"),
        justification: if justifications.is_empty() {
            None
        } else {
            Some(justifications.join(" "))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_verdict_set() {
        let response = json!({
            "verdicts": [
                { "grader": "urgency_grader", "score": 2, "justification": "Moderate urgency." },
                { "grader": "condition_grader", "score": 3, "justification": "Severe presentation." },
                { "grader": "comorbidities_grader", "score": 0.4, "justification": "Two stable comorbidities." }
            ]
        });

        let outcome = outcome_from_response(&response);
        assert_eq!(outcome.clinical_urgency, Some(2));
        assert_eq!(outcome.condition_severity, Some(3));
        assert_eq!(outcome.comorbidities, Some(0.4));
        assert_eq!(
            outcome.justification.as_deref(),
            Some("Moderate urgency. Severe presentation. Two stable comorbidities.")
        );
    }

    #[test]
    fn missing_grader_leaves_field_null() {
        let response = json!({
            "verdicts": [
                { "grader": "urgency_grader", "score": 1, "justification": "Routine." }
            ]
        });

        let outcome = outcome_from_response(&response);
        assert_eq!(outcome.clinical_urgency, Some(1));
        assert_eq!(outcome.condition_severity, None);
        assert_eq!(outcome.comorbidities, None);
        assert_eq!(outcome.justification.as_deref(), Some("Routine."));
    }

    #[test]
    fn malformed_verdict_is_not_an_error() {
        let response = json!({
            "verdicts": [
                { "grader": "urgency_grader", "score": "high" },
                { "grader": "condition_grader", "justification": "   " }
            ]
        });

        let outcome = outcome_from_response(&response);
        assert_eq!(outcome.clinical_urgency, None);
        assert_eq!(outcome.condition_severity, None);
        assert!(outcome.justification.is_none());
    }

    #[test]
    fn empty_response_yields_empty_outcome() {
        let outcome = outcome_from_response(&json!({}));
        assert!(outcome.clinical_urgency.is_none());
        assert!(outcome.justification.is_none());
    }
}
