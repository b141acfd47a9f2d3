use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use appointment_cell::models::Appointment;
use shared_config::AppConfig;

use crate::error::MatchError;
use crate::models::{ranking_payload, Candidate, RankedCandidate};

/// Seam for the external preference-ranking service. An empty ranking means
/// the oracle had nothing usable to say; the caller falls back to the
/// incoming order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RankingOracle: Send + Sync {
    async fn rank(
        &self,
        appointment: Value,
        candidates: Vec<Value>,
    ) -> Result<Vec<RankedCandidate>, MatchError>;
}

/// HTTP client for the remote ranking agent.
pub struct AgentRankingClient {
    client: Client,
    base_url: String,
}

impl AgentRankingClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.ranking_agent_url.clone(),
        }
    }
}

#[async_trait]
impl RankingOracle for AgentRankingClient {
    async fn rank(
        &self,
        appointment: Value,
        candidates: Vec<Value>,
    ) -> Result<Vec<RankedCandidate>, MatchError> {
        let url = format!("{}/v1/rank", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "appointment": appointment,
                "candidates": candidates,
            }))
            .send()
            .await
            .map_err(|e| MatchError::Ranking(format!("ranking request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MatchError::Ranking(format!(
                "ranking request failed: HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| MatchError::Ranking(format!("malformed ranking response: {}", e)))?;

        Ok(rankings_from_response(&body))
    }
}

/// Pull usable positions out of a ranking response. Anything malformed is
/// skipped item by item; an unusable body yields an empty ranking rather
/// than an error.
pub fn rankings_from_response(body: &Value) -> Vec<RankedCandidate> {
    if body.get("status").and_then(Value::as_str) != Some("success") {
        return Vec::new();
    }

    body.get("rankings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Reorders candidates by the ranking oracle's verdict. Oracle trouble of
/// any kind degrades to the incoming (clinical/proximity) order.
pub struct PreferenceRanker {
    oracle: Arc<dyn RankingOracle>,
}

impl PreferenceRanker {
    pub fn new(oracle: Arc<dyn RankingOracle>) -> Self {
        Self { oracle }
    }

    pub async fn rank(
        &self,
        appointment: &Appointment,
        candidates: Vec<Candidate>,
    ) -> Vec<Candidate> {
        if candidates.len() <= 1 {
            return candidates;
        }

        let appointment_payload = json!({
            "datetime": appointment.appointment_time,
            "properties": appointment.properties,
        });
        let candidate_payloads: Vec<Value> = candidates.iter().map(ranking_payload).collect();

        match self.oracle.rank(appointment_payload, candidate_payloads).await {
            Ok(rankings) if !rankings.is_empty() => merge_rankings(candidates, &rankings),
            Ok(_) => {
                debug!(
                    "Ranking oracle returned nothing usable for appointment {}, keeping prior order",
                    appointment.appointment_id
                );
                candidates
            }
            Err(e) => {
                warn!(
                    "Ranking failed for appointment {}, keeping prior order: {}",
                    appointment.appointment_id, e
                );
                candidates
            }
        }
    }
}

/// Apply oracle positions to the candidate list. Positions naming unknown
/// entries are dropped; candidates the oracle skipped are dropped too, the
/// oracle having seen and passed on them. If nothing matches, the incoming
/// order survives untouched.
pub fn merge_rankings(
    mut candidates: Vec<Candidate>,
    rankings: &[RankedCandidate],
) -> Vec<Candidate> {
    let mut ranked = Vec::with_capacity(rankings.len());

    for position in rankings {
        if let Some(idx) = candidates
            .iter()
            .position(|c| c.entry.waitlist_id == position.waitlist_id)
        {
            let mut candidate = candidates.remove(idx);
            candidate.rank = Some(position.rank);
            candidate.reasoning = position.reasoning.clone();
            ranked.push(candidate);
        }
    }

    if ranked.is_empty() {
        return candidates;
    }

    ranked.sort_by_key(|c| c.rank.unwrap_or(u32::MAX));
    ranked
}
