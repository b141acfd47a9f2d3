use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::error::AppointmentError;
use appointment_cell::models::{AppointmentQueryParams, CreateAppointmentRequest};
use appointment_cell::services::appointments::AppointmentService;
use shared_config::AppConfig;
use shared_database::StoreClient;

fn service_for(server: &MockServer) -> AppointmentService {
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
    AppointmentService::new(Arc::new(StoreClient::new(&config)))
}

#[tokio::test]
async fn create_appointment_posts_an_unheld_slot() {
    let server = MockServer::start().await;
    let department_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "department_id": department_id,
            "waitlist_id": null,
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = service_for(&server)
        .create_appointment(CreateAppointmentRequest {
            appointment_time: Utc::now() + Duration::days(3),
            department_id,
            hospital_id: Uuid::new_v4(),
            properties: Some(json!({ "language": "en" })),
            assign_at: None,
        })
        .await
        .unwrap();

    assert!(appointment.waitlist_id.is_none());
    assert!(appointment.assigner_email.is_none());
}

#[tokio::test]
async fn auto_assignable_query_filters_on_lapsed_hold_windows() {
    let server = MockServer::start().await;
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("waitlist_id", "is.null"))
        .and(query_param_contains("or", "assign_at.lte"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "appointment_id": slot_id,
            "appointment_time": (Utc::now() + Duration::hours(6)).to_rfc3339(),
            "department_id": Uuid::new_v4(),
            "hospital_id": Uuid::new_v4(),
            "waitlist_id": null,
            "assign_at": null,
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let params = AppointmentQueryParams {
        unassigned_only: Some(true),
        auto_assignable: Some(true),
        ..Default::default()
    };
    let slots = service_for(&server).query_appointments(&params).await.unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].appointment_id, slot_id);
}

#[tokio::test]
async fn unknown_facility_is_an_error_not_an_empty_postcode() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/hospitals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service_for(&server).hospital_postcode(Uuid::new_v4()).await;
    assert_matches!(result, Err(AppointmentError::FacilityNotFound(_)));
}

#[tokio::test]
async fn missing_appointment_reads_as_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let found = service_for(&server)
        .get_appointment(Uuid::new_v4())
        .await
        .unwrap();
    assert!(found.is_none());
}
