//! HTTP route definitions.

mod alerts;
mod appointments;
mod clinic;
mod exams;
mod health;
mod patients;
mod records;
mod session;
mod staff;
mod sync;

use axum::{routing::get, Router};

use crate::websocket::ws_handler;
use crate::AppState;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    let api = Router::new()
        .merge(session::routes())
        .merge(clinic::routes())
        .merge(staff::routes())
        .merge(patients::routes())
        .merge(appointments::routes())
        .merge(exams::routes())
        .merge(alerts::routes())
        .merge(records::routes())
        .merge(sync::routes());

    Router::new()
        .merge(health::routes())
        .nest("/api", api)
        .route("/ws", get(ws_handler))
}
