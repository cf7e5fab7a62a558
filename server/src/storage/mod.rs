//! Storage tiers: the local durable blob and the remote document store.

pub mod local;
pub mod remote;

pub use local::{
    FileKeyValueStore, KeyValueStore, LocalStateStore, LocalStore, LocalStoreError,
    MemoryKeyValueStore, STATE_KEY,
};
pub use remote::{
    DocumentStore, MemoryDocumentStore, PgDocumentStore, RemoteError, RemoteStore, TenantDocuments,
};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
