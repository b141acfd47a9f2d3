use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::StoreClient;
use waitlist_cell::models::{AddPatientRequest, GradeOverrideRequest};
use waitlist_cell::services::waitlist::WaitlistService;

fn service_for(server: &MockServer) -> WaitlistService {
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
    WaitlistService::new(Arc::new(StoreClient::new(&config)))
}

#[tokio::test]
async fn returning_patient_rolls_previous_notes_into_history() {
    let server = MockServer::start().await;
    let department_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist"))
        .and(query_param_contains("medical_number", "MN777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "waitlist_id": Uuid::new_v4(),
            "medical_number": "MN777",
            "referral_date": "2025-03-10T09:00:00Z",
            "date_of_birth": "1980-01-01",
            "postcode": "AA1 1AA",
            "department_id": department_id,
            "referral_notes": "Persistent knee pain after fall.",
            "is_seen": true,
            "is_assigned": false,
            "prefers_evening": false,
        }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/waitlist"))
        .and(body_partial_json(json!({
            "medical_number": "MN777",
            "medical_history": [
                { "date": "2025-03-10", "notes": "Persistent knee pain after fall." }
            ],
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let entry = service_for(&server)
        .add_patient(AddPatientRequest {
            medical_number: "MN777".into(),
            referral_date: Utc.with_ymd_and_hms(2025, 8, 1, 10, 0, 0).unwrap(),
            date_of_birth: None,
            postcode: None,
            referral_department: department_id,
            referral_notes: Some("Knee pain has returned.".into()),
            medical_history: None,
            preferences: None,
            prefers_evening: None,
        })
        .await
        .unwrap();

    // Demographics missing from the request come from the previous episode.
    assert_eq!(entry.date_of_birth.as_deref(), Some("1980-01-01"));
    assert_eq!(entry.postcode.as_deref(), Some("AA1 1AA"));
    let history = entry.medical_history.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].date, "2025-03-10");
    // The new entry starts ungraded regardless of the old one.
    assert!(entry.grading_status.is_none());
    assert!(entry.clinical_urgency.is_none());
}

#[tokio::test]
async fn matching_override_values_write_nothing() {
    let server = MockServer::start().await;
    let waitlist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "waitlist_id": waitlist_id,
            "medical_number": "MN1",
            "referral_date": "2025-06-01T09:00:00Z",
            "department_id": Uuid::new_v4(),
            "clinical_urgency": 5,
            "condition_severity": 3,
            "comorbidities": 0.2,
            "grading_status": "COMPLETED",
            "is_seen": false,
            "is_assigned": false,
            "prefers_evening": false,
        }])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let result = service_for(&server)
        .override_grade(
            waitlist_id,
            GradeOverrideRequest {
                clinical_urgency: 5,
                condition_severity: 3,
                // Within tolerance of the stored value.
                comorbidities: 0.2004,
            },
        )
        .await
        .unwrap();

    assert!(result.is_some());
    assert!(result.unwrap().edited_at.is_none());
}

#[tokio::test]
async fn changed_override_values_stamp_edited_at() {
    let server = MockServer::start().await;
    let waitlist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "waitlist_id": waitlist_id,
            "medical_number": "MN1",
            "referral_date": "2025-06-01T09:00:00Z",
            "department_id": Uuid::new_v4(),
            "clinical_urgency": 5,
            "condition_severity": 3,
            "comorbidities": 0.2,
            "grading_status": "COMPLETED",
            "is_seen": false,
            "is_assigned": false,
            "prefers_evening": false,
        }])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist"))
        .and(body_partial_json(json!({ "clinical_urgency": 8 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = service_for(&server)
        .override_grade(
            waitlist_id,
            GradeOverrideRequest {
                clinical_urgency: 8,
                condition_severity: 3,
                comorbidities: 0.2,
            },
        )
        .await
        .unwrap();

    assert!(result.is_some());
}

#[tokio::test]
async fn mark_seen_flags_patients_with_past_appointments() {
    let server = MockServer::start().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param_contains("appointment_time", "lt."))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "waitlist_id": first },
            { "waitlist_id": second },
        ])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist"))
        .and(query_param_contains("waitlist_id", "in.("))
        .and(body_partial_json(json!({ "is_seen": true })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let marked = service_for(&server).mark_seen().await.unwrap();
    assert_eq!(marked, 2);
}

#[tokio::test]
async fn mark_seen_with_no_past_holders_writes_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let marked = service_for(&server).mark_seen().await.unwrap();
    assert_eq!(marked, 0);
}
