//! Clinic Server - data-access service for the clinic app.

use std::sync::Arc;

use clinic_engine::SystemClock;
use clinic_server::analysis::{AnalysisProvider, DisabledProvider, OllamaProvider};
use clinic_server::auth::{Authenticator, DisabledAuthenticator, HttpAuthenticator};
use clinic_server::config::Config;
use clinic_server::error::InitError;
use clinic_server::service::{DataService, ServiceOptions, SyncPolicy};
use clinic_server::storage::{
    self, FileKeyValueStore, LocalStateStore, PgDocumentStore, TenantDocuments,
};
use clinic_server::{build_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clinic_server=debug,clinic_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().map_err(InitError::from)?;

    tracing::info!("Starting Clinic Server on {}:{}", config.host, config.port);

    let kv = FileKeyValueStore::open(&config.local_store_dir, config.local_store_quota_bytes)
        .map_err(InitError::from)?;
    let local = Arc::new(LocalStateStore::new(kv));
    let mut service = DataService::new(local, Arc::new(SystemClock));

    match &config.database_url {
        Some(url) => {
            let pool = storage::create_pool(url).await.map_err(InitError::from)?;
            tracing::info!("Running database migrations...");
            storage::run_migrations(&pool).await.map_err(InitError::from)?;
            let documents = Arc::new(PgDocumentStore::new(pool));
            service = service.with_remote(Arc::new(TenantDocuments::new(
                documents,
                config.legacy_document_key.clone(),
            )));
        }
        None => tracing::warn!("DATABASE_URL not set, running with local storage only"),
    }

    let authenticator: Arc<dyn Authenticator> = match &config.auth_service_url {
        Some(url) => Arc::new(
            HttpAuthenticator::new(url, config.remote_timeout).map_err(InitError::from)?,
        ),
        None => Arc::new(DisabledAuthenticator),
    };
    if config.insecure_dev_auth {
        tracing::warn!("INSECURE_DEV_AUTH is on, the development password is accepted");
    }

    let analysis: Arc<dyn AnalysisProvider> = match &config.ai_service_url {
        Some(url) => Arc::new(
            OllamaProvider::new(url, &config.ai_model, config.remote_timeout)
                .map_err(|e| InitError::Analysis(e.to_string()))?,
        ),
        None => {
            tracing::info!("AI_SERVICE_URL not set, analyses use local rules");
            Arc::new(DisabledProvider)
        }
    };

    let service = service
        .with_authenticator(authenticator)
        .with_options(ServiceOptions {
            sync: SyncPolicy {
                timeout: config.remote_timeout,
                max_retries: config.remote_max_retries,
                ..SyncPolicy::default()
            },
            insecure_dev_auth: config.insecure_dev_auth,
        });
    let service = Arc::new(service);

    let report = service.initialize(config.default_tenant.as_deref()).await?;
    tracing::info!(
        tenant_id = %report.tenant_id,
        decision = ?report.decision,
        "clinic state loaded"
    );

    let app = build_router(AppState::new(service, analysis).await);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
