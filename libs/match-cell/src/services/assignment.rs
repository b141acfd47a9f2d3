use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use urlencoding::encode;
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentQueryParams};
use appointment_cell::services::appointments::AppointmentService;
use shared_config::AppConfig;
use shared_database::StoreClient;
use shared_utils::time::{is_evening_hours, within_next_24_hours};

use crate::error::MatchError;
use crate::models::{Assignment, AssignmentSummary, Candidate};
use crate::services::proximity::{ProximityAugmenter, RoutesApiClient, RoutingOracle};
use crate::services::ranking::{AgentRankingClient, PreferenceRanker, RankingOracle};
use crate::services::selector::CandidateSelector;

/// Stamped on assignments made by the automatic pipeline.
const DEFAULT_ASSIGNER: &str = "admin@medical.uk";

/// Drives the selection pipeline end to end and owns every holder mutation:
/// selection, proximity, ranking, then the three-step commit.
pub struct AssignmentCoordinator {
    store: Arc<StoreClient>,
    appointments: AppointmentService,
    selector: CandidateSelector,
    augmenter: ProximityAugmenter,
    ranker: PreferenceRanker,
    candidate_limit: usize,
    clinic_utc_offset_hours: i32,
}

impl AssignmentCoordinator {
    pub fn new(store: Arc<StoreClient>, config: &AppConfig) -> Self {
        Self::with_oracles(
            store,
            config,
            Arc::new(RoutesApiClient::new(config)),
            Arc::new(AgentRankingClient::new(config)),
        )
    }

    pub fn with_oracles(
        store: Arc<StoreClient>,
        config: &AppConfig,
        routing: Arc<dyn RoutingOracle>,
        ranking: Arc<dyn RankingOracle>,
    ) -> Self {
        Self {
            appointments: AppointmentService::new(Arc::clone(&store)),
            selector: CandidateSelector::new(Arc::clone(&store)),
            augmenter: ProximityAugmenter::new(routing),
            ranker: PreferenceRanker::new(ranking),
            store,
            candidate_limit: config.candidate_limit,
            clinic_utc_offset_hours: config.clinic_utc_offset_hours,
        }
    }

    /// Assign every future slot that is open for automatic assignment.
    /// Never raises; a store failure up front is reported in the summary.
    #[instrument(skip(self))]
    pub async fn automatic_assignment(&self) -> AssignmentSummary {
        let params = AppointmentQueryParams {
            unassigned_only: Some(true),
            auto_assignable: Some(true),
            ..Default::default()
        };

        match self.appointments.query_appointments(&params).await {
            Ok(open_slots) => {
                info!("Automatic assignment over {} open slots", open_slots.len());
                self.assign_batch(open_slots).await
            }
            Err(e) => AssignmentSummary {
                successful: 0,
                failed: 0,
                message: format!("Critical error: {}", e),
            },
        }
    }

    /// Assign a caller-chosen set of slots. Slots that are past, already
    /// assigned, missing, or outside their hold window count as failed
    /// without touching anything.
    #[instrument(skip(self))]
    pub async fn assign_selected(&self, appointment_ids: Vec<Uuid>) -> AssignmentSummary {
        let mut rejected_up_front = 0;
        let mut assignable = Vec::new();

        for appointment_id in appointment_ids {
            match self.manually_assignable_slot(appointment_id).await {
                Ok(Some(appointment)) => assignable.push(appointment),
                Ok(None) => {
                    warn!("Appointment {} is not manually assignable", appointment_id);
                    rejected_up_front += 1;
                }
                Err(e) => {
                    warn!("Failed to vet appointment {}: {}", appointment_id, e);
                    rejected_up_front += 1;
                }
            }
        }

        let mut summary = self.assign_batch(assignable).await;
        summary.failed += rejected_up_front;
        summary
    }

    async fn assign_batch(&self, appointments: Vec<Appointment>) -> AssignmentSummary {
        let mut successful = 0;
        let mut failed = 0;
        let mut last_error: Option<String> = None;
        let mut none_found = false;

        for appointment in appointments {
            match self.find_best_candidate(&appointment).await {
                Ok(Some(waitlist_id)) => {
                    let assignment = Assignment {
                        appointment_id: appointment.appointment_id,
                        waitlist_id,
                        assigner_email: None,
                    };
                    match self.commit(&assignment).await {
                        Ok(()) => successful += 1,
                        Err(e) => {
                            warn!(
                                "Commit failed for appointment {}: {}",
                                appointment.appointment_id, e
                            );
                            last_error = Some(e.to_string());
                            failed += 1;
                        }
                    }
                }
                Ok(None) => {
                    // Nobody suitable; release the hold window so the slot
                    // does not sit reserved forever, and leave the waitlist
                    // untouched.
                    if let Err(e) = self.clear_hold(appointment.appointment_id).await {
                        warn!(
                            "Failed to clear hold on appointment {}: {}",
                            appointment.appointment_id, e
                        );
                        last_error = Some(e.to_string());
                    }
                    none_found = true;
                    failed += 1;
                }
                Err(e) => {
                    warn!(
                        "Candidate search failed for appointment {}: {}",
                        appointment.appointment_id, e
                    );
                    last_error = Some(e.to_string());
                    failed += 1;
                }
            }
        }

        let message = match last_error {
            Some(e) => e,
            None if none_found => {
                "Assignment completed. No patient found for one or more appointments.".to_string()
            }
            None => "Assignment completed successfully.".to_string(),
        };

        AssignmentSummary {
            successful,
            failed,
            message,
        }
    }

    /// The full pipeline for one slot, returning the winner's id.
    pub async fn find_best_candidate(
        &self,
        appointment: &Appointment,
    ) -> Result<Option<Uuid>, MatchError> {
        let candidates = self.candidate_pipeline(appointment).await?;
        Ok(candidates.first().map(|c| c.entry.waitlist_id))
    }

    /// Selection, then proximity for imminent slots, then preference
    /// ranking. A lone candidate skips the ranking oracle outright.
    pub async fn candidate_pipeline(
        &self,
        appointment: &Appointment,
    ) -> Result<Vec<Candidate>, MatchError> {
        let now = Utc::now();
        let evening_first = is_evening_hours(now, self.clinic_utc_offset_hours);

        let entries = self
            .selector
            .select(
                appointment.appointment_id,
                appointment.department_id,
                self.candidate_limit,
                evening_first,
                now,
            )
            .await?;

        let mut candidates: Vec<Candidate> =
            entries.into_iter().map(Candidate::from_entry).collect();
        if candidates.is_empty() {
            return Ok(candidates);
        }

        if within_next_24_hours(appointment.appointment_time, now) {
            let facility_postcode = self
                .appointments
                .hospital_postcode(appointment.hospital_id)
                .await?;
            candidates = self
                .augmenter
                .augment(candidates, &facility_postcode, appointment.appointment_time)
                .await;
        }

        if candidates.len() == 1 {
            return Ok(candidates);
        }

        Ok(self.ranker.rank(appointment, candidates).await)
    }

    /// Ranked candidates for a slot, for review ahead of a manual
    /// assignment. Empty when the slot is not manually assignable.
    pub async fn candidates_for(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<Candidate>, MatchError> {
        match self.manually_assignable_slot(appointment_id).await? {
            Some(appointment) => self.candidate_pipeline(&appointment).await,
            None => Ok(Vec::new()),
        }
    }

    /// Commit a caller-chosen pairing. Refused (without side effects) when
    /// the slot's hold window has lapsed or the slot is gone.
    pub async fn manual_assign(&self, assignment: Assignment) -> Result<bool, MatchError> {
        if self
            .manually_assignable_slot(assignment.appointment_id)
            .await?
            .is_none()
        {
            return Ok(false);
        }

        self.commit(&assignment).await?;
        Ok(true)
    }

    /// A future slot open to manual assignment: no hold window, or a hold
    /// window still running. Already-held-and-lapsed slots belong to the
    /// automatic pipeline.
    async fn manually_assignable_slot(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Appointment>, MatchError> {
        let now = Utc::now().to_rfc3339();
        let path = format!(
            "/rest/v1/appointments?appointment_id=eq.{}\
             &appointment_time=gte.{}&or=(assign_at.is.null,assign_at.gte.{})",
            appointment_id,
            encode(&now),
            encode(&now)
        );

        let mut rows: Vec<Appointment> = self
            .store
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    /// The three-step commit: free the previous holder, write the slot,
    /// flag the new holder. `assign_at` is cleared so the slot leaves its
    /// hold window the moment it gains a holder.
    pub async fn commit(&self, assignment: &Assignment) -> Result<(), MatchError> {
        let holder_path = format!(
            "/rest/v1/appointments?select=waitlist_id\
             &appointment_id=eq.{}&waitlist_id=not.is.null",
            assignment.appointment_id
        );
        let rows: Vec<Value> = self
            .store
            .request(Method::GET, &holder_path, None)
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        if let Some(previous) = rows
            .first()
            .and_then(|row| row.get("waitlist_id"))
            .and_then(Value::as_str)
        {
            let path = format!("/rest/v1/waitlist?waitlist_id=eq.{}", previous);
            self.store
                .execute(Method::PATCH, &path, Some(json!({ "is_assigned": false })))
                .await
                .map_err(|e| MatchError::Store(e.to_string()))?;
            info!(
                "Released previous holder {} of appointment {}",
                previous, assignment.appointment_id
            );
        }

        let slot_path = format!(
            "/rest/v1/appointments?appointment_id=eq.{}",
            assignment.appointment_id
        );
        let assigner = assignment
            .assigner_email
            .clone()
            .unwrap_or_else(|| DEFAULT_ASSIGNER.to_string());
        self.store
            .execute(
                Method::PATCH,
                &slot_path,
                Some(json!({
                    "waitlist_id": assignment.waitlist_id,
                    "assign_at": null,
                    "assigner_email": assigner,
                })),
            )
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        let patient_path = format!(
            "/rest/v1/waitlist?waitlist_id=eq.{}",
            assignment.waitlist_id
        );
        self.store
            .execute(Method::PATCH, &patient_path, Some(json!({ "is_assigned": true })))
            .await
            .map_err(|e| MatchError::Store(e.to_string()))?;

        info!(
            "Assigned waitlist entry {} to appointment {}",
            assignment.waitlist_id, assignment.appointment_id
        );
        Ok(())
    }

    async fn clear_hold(&self, appointment_id: Uuid) -> Result<(), MatchError> {
        let path = format!("/rest/v1/appointments?appointment_id=eq.{}", appointment_id);
        self.store
            .execute(Method::PATCH, &path, Some(json!({ "assign_at": null })))
            .await
            .map_err(|e| MatchError::Store(e.to_string()))
    }

    /// Repair holders whose own flag was lost to a partial commit: the slot
    /// names them but their entry says unassigned. Returns how many entries
    /// were repaired.
    #[instrument(skip(self))]
    pub async fn reconcile_assignments(&self) -> Result<usize, MatchError> {
        let held = self.appointments.appointments_with_holder().await?;
        let mut repaired = 0;

        for appointment in held {
            let Some(holder) = appointment.waitlist_id else {
                continue;
            };

            let check_path = format!(
                "/rest/v1/waitlist?select=waitlist_id\
                 &waitlist_id=eq.{}&is_assigned=is.false",
                holder
            );
            let rows: Vec<Value> = self
                .store
                .request(Method::GET, &check_path, None)
                .await
                .map_err(|e| MatchError::Store(e.to_string()))?;

            if rows.is_empty() {
                continue;
            }

            warn!(
                "Waitlist entry {} holds appointment {} but is flagged unassigned, repairing",
                holder, appointment.appointment_id
            );
            let fix_path = format!("/rest/v1/waitlist?waitlist_id=eq.{}", holder);
            self.store
                .execute(Method::PATCH, &fix_path, Some(json!({ "is_assigned": true })))
                .await
                .map_err(|e| MatchError::Store(e.to_string()))?;
            repaired += 1;
        }

        Ok(repaired)
    }
}
