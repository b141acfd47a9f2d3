use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::error::MatchError;
use crate::models::Candidate;

/// Seam for the external distance-matrix service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoutingOracle: Send + Sync {
    /// Driving distance in metres from an origin postcode to a destination
    /// postcode, arriving at the given time.
    async fn driving_distance_meters(
        &self,
        origin: &str,
        destination: &str,
        arrival: DateTime<Utc>,
    ) -> Result<f64, MatchError>;
}

/// HTTP client for the routes distance-matrix API.
pub struct RoutesApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<DistanceValue>,
}

#[derive(Debug, Deserialize)]
struct DistanceValue {
    value: f64,
}

impl RoutesApiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.routes_api_url.clone(),
            api_key: config.routes_api_key.clone(),
        }
    }
}

#[async_trait]
impl RoutingOracle for RoutesApiClient {
    async fn driving_distance_meters(
        &self,
        origin: &str,
        destination: &str,
        arrival: DateTime<Utc>,
    ) -> Result<f64, MatchError> {
        let url = format!("{}/distancematrix", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("origins", origin),
                ("destinations", destination),
                ("mode", "driving"),
                ("arrival_time", &arrival.timestamp().to_string()),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| MatchError::Routing(format!("distance request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MatchError::Routing(format!(
                "distance request failed: HTTP {}",
                response.status()
            )));
        }

        let matrix: DistanceMatrixResponse = response
            .json()
            .await
            .map_err(|e| MatchError::Routing(format!("malformed distance response: {}", e)))?;

        if matrix.status != "OK" {
            return Err(MatchError::Routing(format!(
                "distance lookup rejected: {}",
                matrix.status
            )));
        }

        let element = matrix
            .rows
            .first()
            .and_then(|row| row.elements.first())
            .ok_or_else(|| MatchError::Routing("empty distance matrix".into()))?;

        if element.status != "OK" {
            return Err(MatchError::Routing(format!(
                "no route between {} and {}: {}",
                origin, destination, element.status
            )));
        }

        element
            .distance
            .as_ref()
            .map(|d| d.value)
            .ok_or_else(|| MatchError::Routing("distance element without value".into()))
    }
}

/// Annotates candidates with driving distance to the hosting facility and
/// reorders them by it. Only invoked for imminent appointments.
pub struct ProximityAugmenter {
    routing: Arc<dyn RoutingOracle>,
}

impl ProximityAugmenter {
    pub fn new(routing: Arc<dyn RoutingOracle>) -> Self {
        Self { routing }
    }

    /// Every candidate gets a distance; lookups that fail or lack a postcode
    /// yield infinity so the candidate survives the stage but sorts last.
    /// The sort is stable, so clinical order is preserved among ties.
    pub async fn augment(
        &self,
        candidates: Vec<Candidate>,
        facility_postcode: &str,
        arrival: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let mut augmented = Vec::with_capacity(candidates.len());

        for mut candidate in candidates {
            let distance = match candidate.entry.postcode.as_deref() {
                Some(postcode) => match self
                    .routing
                    .driving_distance_meters(postcode, facility_postcode, arrival)
                    .await
                {
                    Ok(meters) => meters,
                    Err(e) => {
                        warn!(
                            "Distance lookup failed for waitlist entry {}: {}",
                            candidate.entry.waitlist_id, e
                        );
                        f64::INFINITY
                    }
                },
                None => {
                    debug!(
                        "Waitlist entry {} has no postcode, treating as unreachable",
                        candidate.entry.waitlist_id
                    );
                    f64::INFINITY
                }
            };

            candidate.proximity_meters = Some(distance);
            augmented.push(candidate);
        }

        augmented.sort_by(|a, b| {
            a.proximity_meters
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.proximity_meters.unwrap_or(f64::INFINITY))
        });
        augmented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;
    use waitlist_cell::models::WaitlistEntry;

    fn candidate(id: u32, postcode: Option<&str>) -> Candidate {
        Candidate::from_entry(WaitlistEntry {
            waitlist_id: Uuid::from_u128(id as u128),
            medical_number: format!("MN{}", id),
            referral_date: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            date_of_birth: None,
            postcode: postcode.map(String::from),
            department_id: Uuid::nil(),
            referral_notes: None,
            medical_history: None,
            clinical_urgency: Some(5),
            condition_severity: Some(5),
            comorbidities: Some(1.0),
            grading_justification: None,
            grading_status: None,
            graded_at: None,
            edited_at: None,
            is_seen: false,
            is_assigned: false,
            preferences: None,
            prefers_evening: false,
            deleted_at: None,
        })
    }

    fn arrival() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 15, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn sorts_by_distance_ascending() {
        let mut oracle = MockRoutingOracle::new();
        oracle
            .expect_driving_distance_meters()
            .withf(|origin, _, _| origin == "AB1 2CD")
            .returning(|_, _, _| Ok(9000.0));
        oracle
            .expect_driving_distance_meters()
            .withf(|origin, _, _| origin == "EF3 4GH")
            .returning(|_, _, _| Ok(1200.0));

        let augmenter = ProximityAugmenter::new(Arc::new(oracle));
        let out = augmenter
            .augment(
                vec![candidate(1, Some("AB1 2CD")), candidate(2, Some("EF3 4GH"))],
                "ZZ9 9ZZ",
                arrival(),
            )
            .await;

        assert_eq!(out[0].entry.waitlist_id, Uuid::from_u128(2));
        assert_eq!(out[0].proximity_meters, Some(1200.0));
        assert_eq!(out[1].proximity_meters, Some(9000.0));
    }

    #[tokio::test]
    async fn failed_lookup_sorts_last_instead_of_dropping() {
        let mut oracle = MockRoutingOracle::new();
        oracle
            .expect_driving_distance_meters()
            .withf(|origin, _, _| origin == "AB1 2CD")
            .returning(|_, _, _| Err(MatchError::Routing("no route".into())));
        oracle
            .expect_driving_distance_meters()
            .withf(|origin, _, _| origin == "EF3 4GH")
            .returning(|_, _, _| Ok(500.0));

        let augmenter = ProximityAugmenter::new(Arc::new(oracle));
        let out = augmenter
            .augment(
                vec![candidate(1, Some("AB1 2CD")), candidate(2, Some("EF3 4GH"))],
                "ZZ9 9ZZ",
                arrival(),
            )
            .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].entry.waitlist_id, Uuid::from_u128(2));
        assert_eq!(out[1].proximity_meters, Some(f64::INFINITY));
    }

    #[tokio::test]
    async fn missing_postcode_is_unreachable_without_a_lookup() {
        let mut oracle = MockRoutingOracle::new();
        oracle.expect_driving_distance_meters().never();

        let augmenter = ProximityAugmenter::new(Arc::new(oracle));
        let out = augmenter
            .augment(vec![candidate(1, None)], "ZZ9 9ZZ", arrival())
            .await;

        assert_eq!(out[0].proximity_meters, Some(f64::INFINITY));
    }

    #[tokio::test]
    async fn equal_distances_keep_incoming_order() {
        let mut oracle = MockRoutingOracle::new();
        oracle
            .expect_driving_distance_meters()
            .returning(|_, _, _| Ok(3000.0));

        let augmenter = ProximityAugmenter::new(Arc::new(oracle));
        let out = augmenter
            .augment(
                vec![candidate(7, Some("AB1 2CD")), candidate(3, Some("EF3 4GH"))],
                "ZZ9 9ZZ",
                arrival(),
            )
            .await;

        assert_eq!(out[0].entry.waitlist_id, Uuid::from_u128(7));
        assert_eq!(out[1].entry.waitlist_id, Uuid::from_u128(3));
    }
}
