//! Change feed: protocol messages and delivery of store changes to
//! connections of the same clinic.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use clinic_engine::seed::{SEED_ADMIN_EMAIL, SEED_TENANT_ID};
use clinic_engine::{Gender, ManualClock, PatientInput};
use clinic_server::analysis::DisabledProvider;
use clinic_server::config::DEV_BYPASS_PASSWORD;
use clinic_server::service::{DataService, LoginRequest, ServiceOptions};
use clinic_server::storage::{LocalStateStore, MemoryKeyValueStore};
use clinic_server::websocket::{ClientMessage, ServerMessage};
use clinic_server::AppState;
use serde_json::Value;
use tokio::sync::mpsc;

async fn state() -> AppState {
    let local = Arc::new(LocalStateStore::new(MemoryKeyValueStore::new()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
    ));
    let service = DataService::new(local, clock).with_options(ServiceOptions {
        insecure_dev_auth: true,
        ..Default::default()
    });
    service.initialize(None).await.unwrap();
    AppState::new(Arc::new(service), Arc::new(DisabledProvider)).await
}

#[test]
fn client_messages_parse() {
    let status: ClientMessage =
        serde_json::from_str(r#"{"type":"status","request_id":"req-1"}"#).unwrap();
    assert!(matches!(
        status,
        ClientMessage::Status { request_id: Some(ref id) } if id == "req-1"
    ));

    let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
    assert!(matches!(ping, ClientMessage::Ping));

    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"push"}"#).is_err());
}

#[test]
fn error_message_omits_missing_request_id() {
    let value = serde_json::to_value(ServerMessage::error("bad", None)).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["message"], "bad");
    assert!(value.get("request_id").is_none());
}

#[tokio::test]
async fn store_changes_reach_connections_of_the_clinic() {
    let state = state().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (other_tx, mut other_rx) = mpsc::unbounded_channel();
    state
        .conn_manager
        .register(SEED_TENANT_ID.into(), "demo-admin".into(), tx);
    state
        .conn_manager
        .register("elsewhere".into(), "u-9".into(), other_tx);

    let response = state
        .service
        .login(LoginRequest {
            clinic: "demo".into(),
            email: SEED_ADMIN_EMAIL.into(),
            password: DEV_BYPASS_PASSWORD.into(),
        })
        .await
        .unwrap();
    let session = state.service.sessions().get(&response.token).unwrap();

    let patient = state
        .service
        .mutate(&session, |store, tenant| {
            store.create_patient(
                tenant,
                PatientInput {
                    name: "Marta Alves".into(),
                    email: None,
                    phone: None,
                    birth_date: None,
                    gender: Gender::Female,
                    assigned_professional_id: None,
                    diagnosis: None,
                    pathologies: Vec::new(),
                    objective: None,
                    is_active: true,
                },
            )
        })
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(message) = rx.try_recv() {
        seen.push(serde_json::to_value(message).unwrap());
    }
    let created = seen
        .iter()
        .filter(|m| m["type"] == "changed")
        .map(|m| &m["change"])
        .find(|c| c["collection"] == "patients" && c["kind"] == "created")
        .cloned()
        .unwrap_or(Value::Null);
    assert_eq!(created["id"], patient.id.as_str());
    assert_eq!(created["tenantId"], SEED_TENANT_ID);

    assert!(other_rx.try_recv().is_err());
}
