//! Clinic Server - data-access service for the clinic app.
//!
//! Owns the clinic state for the life of the process, persists every change
//! to local storage first and to the remote document store in the
//! background, and exposes the engine's operations over HTTP plus a
//! WebSocket change feed.

pub mod analysis;
pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod service;
pub mod storage;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analysis::AnalysisProvider;
use crate::service::DataService;
use crate::websocket::ConnectionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DataService>,
    pub analysis: Arc<dyn AnalysisProvider>,
    pub conn_manager: Arc<ConnectionManager>,
}

impl AppState {
    /// Wire the change feed to the store and bundle the handles.
    pub async fn new(service: Arc<DataService>, analysis: Arc<dyn AnalysisProvider>) -> Self {
        let conn_manager = ConnectionManager::new_shared();
        service.subscribe(conn_manager.clone()).await;
        Self {
            service,
            analysis,
            conn_manager,
        }
    }
}

/// The full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
