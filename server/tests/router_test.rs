//! HTTP surface tests, driven through the router without a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use clinic_engine::seed::{SEED_ADMIN_EMAIL, SEED_TENANT_ID};
use clinic_engine::ManualClock;
use clinic_server::analysis::DisabledProvider;
use clinic_server::config::DEV_BYPASS_PASSWORD;
use clinic_server::service::{DataService, ServiceOptions};
use clinic_server::storage::{LocalStateStore, MemoryKeyValueStore};
use clinic_server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app() -> Router {
    let local = Arc::new(LocalStateStore::new(MemoryKeyValueStore::new()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
    ));
    let service = DataService::new(local, clock).with_options(ServiceOptions {
        insecure_dev_auth: true,
        ..Default::default()
    });
    service.initialize(None).await.unwrap();
    let state = AppState::new(Arc::new(service), Arc::new(DisabledProvider)).await;
    build_router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn login(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/session",
        None,
        Some(json!({ "clinic": "demo", "email": email, "password": DEV_BYPASS_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_the_active_clinic() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeTenant"], SEED_TENANT_ID);
    assert_eq!(body["remoteEnabled"], false);
}

#[tokio::test]
async fn api_requires_a_session() {
    let app = app().await;

    let (status, _) = send(&app, Method::GET, "/api/patients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/patients", Some("nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_sees_every_patient() {
    let app = app().await;
    let token = login(&app, SEED_ADMIN_EMAIL).await;

    let (status, body) = send(&app, Method::GET, "/api/patients", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(&app, Method::GET, "/api/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], SEED_ADMIN_EMAIL);
    assert_eq!(body["clinic"]["id"], SEED_TENANT_ID);
}

#[tokio::test]
async fn professionals_only_see_their_own_patients() {
    let app = app().await;
    let token = login(&app, "rita.lopes@demo.clinic").await;

    let (status, body) = send(&app, Method::GET, "/api/patients", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/patients",
        Some(&token),
        Some(json!({ "name": "Marta Alves", "gender": "FEMALE" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(created["assignedProfessionalId"].is_string());

    let (_, body) = send(&app, Method::GET, "/api/patients", Some(&token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::GET, "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_patient_is_unprocessable() {
    let app = app().await;
    let token = login(&app, SEED_ADMIN_EMAIL).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/patients",
        Some(&token),
        Some(json!({ "name": "  ", "gender": "MALE" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn exam_analysis_falls_back_without_ai_service() {
    let app = app().await;
    let token = login(&app, SEED_ADMIN_EMAIL).await;

    let (status, exam) = send(
        &app,
        Method::POST,
        "/api/exams",
        Some(&token),
        Some(json!({
            "patientId": "demo-patient-1",
            "title": "Fasting panel",
            "date": "2024-03-01T08:00:00Z",
            "markers": [
                { "name": "Glucose", "value": 130.0, "unit": "mg/dL", "reference": { "min": 70.0, "max": 99.0 } }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{exam}");
    let id = exam["id"].as_str().unwrap();

    let (status, analysed) = send(
        &app,
        Method::POST,
        &format!("/api/exams/{id}/analysis"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysed["analysis"]["source"], "FALLBACK");
}

#[tokio::test]
async fn sync_without_remote_is_a_conflict() {
    let app = app().await;
    let token = login(&app, SEED_ADMIN_EMAIL).await;

    let (status, _) = send(&app, Method::POST, "/api/sync", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, Method::GET, "/api/sync/status", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remoteEnabled"], false);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = app().await;
    let token = login(&app, SEED_ADMIN_EMAIL).await;

    let (status, _) = send(&app, Method::DELETE, "/api/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/patients", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
