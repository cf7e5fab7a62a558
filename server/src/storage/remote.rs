//! Remote document storage.
//!
//! A clinic's state is one JSON document at `tenants/{tenantId}/data/main`.
//! Before tenancy existed, everything lived in `globalData/{key}`; that
//! document is still read when a clinic has nothing of its own, and copied
//! to the clinic's path the first time it is found.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clinic_engine::ClinicState;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::{PgPool, Row};

/// Remote storage errors.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Network(String),

    #[error("remote store did not answer within {0} ms")]
    Timeout(u64),

    #[error("remote document is malformed: {0}")]
    Serialization(String),

    #[error("remote store rejected the request: {0}")]
    Backend(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Path-addressed JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, path: &str) -> Result<Option<Value>, RemoteError>;
    async fn set_document(&self, path: &str, document: &Value) -> Result<(), RemoteError>;
}

/// Per-clinic state storage used by the data service.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, tenant_id: &str) -> Result<Option<ClinicState>, RemoteError>;
    async fn put(&self, tenant_id: &str, state: &ClinicState) -> Result<(), RemoteError>;
}

pub fn tenant_path(tenant_id: &str) -> String {
    format!("tenants/{tenant_id}/data/main")
}

pub fn legacy_path(key: &str) -> String {
    format!("globalData/{key}")
}

/// [`RemoteStore`] laid out over a [`DocumentStore`].
#[derive(Clone)]
pub struct TenantDocuments {
    docs: Arc<dyn DocumentStore>,
    legacy_key: String,
}

impl TenantDocuments {
    pub fn new(docs: Arc<dyn DocumentStore>, legacy_key: impl Into<String>) -> Self {
        Self {
            docs,
            legacy_key: legacy_key.into(),
        }
    }

    fn decode(value: Value) -> Result<ClinicState, RemoteError> {
        ClinicState::from_value(value).map_err(|e| RemoteError::Serialization(e.to_string()))
    }

    /// The legacy document, when it can stand in for `tenant_id`.
    async fn legacy_for(&self, tenant_id: &str) -> Result<Option<ClinicState>, RemoteError> {
        let Some(value) = self.docs.get_document(&legacy_path(&self.legacy_key)).await? else {
            return Ok(None);
        };
        let state = Self::decode(value)?;
        let owned_elsewhere = state
            .active_tenant
            .as_deref()
            .is_some_and(|owner| owner != tenant_id);
        if owned_elsewhere {
            return Ok(None);
        }
        Ok(Some(state))
    }
}

#[async_trait]
impl RemoteStore for TenantDocuments {
    async fn get(&self, tenant_id: &str) -> Result<Option<ClinicState>, RemoteError> {
        if let Some(value) = self.docs.get_document(&tenant_path(tenant_id)).await? {
            return Self::decode(value).map(Some);
        }

        let Some(state) = self.legacy_for(tenant_id).await? else {
            return Ok(None);
        };
        tracing::info!(
            tenant_id = %tenant_id,
            key = %self.legacy_key,
            "found legacy document, copying to clinic path"
        );
        if let Err(e) = self.put(tenant_id, &state).await {
            tracing::warn!(tenant_id = %tenant_id, error = %e, "legacy copy failed");
        }
        Ok(Some(state))
    }

    async fn put(&self, tenant_id: &str, state: &ClinicState) -> Result<(), RemoteError> {
        let value =
            serde_json::to_value(state).map_err(|e| RemoteError::Serialization(e.to_string()))?;
        self.docs.set_document(&tenant_path(tenant_id), &value).await
    }
}

/// Documents in a PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_document(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let row = sqlx::query("SELECT body FROM documents WHERE path = $1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get::<Value, _>("body")?)),
            None => Ok(None),
        }
    }

    async fn set_document(&self, path: &str, document: &Value) -> Result<(), RemoteError> {
        sqlx::query(
            r#"
            INSERT INTO documents (path, body, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (path) DO UPDATE SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(path)
        .bind(document)
        .execute(&self.pool)
        .await?;

        tracing::debug!(path = %path, "remote document written");
        Ok(())
    }
}

/// In-memory documents with injectable faults.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<String, Value>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, path: impl Into<String>, document: Value) {
        self.documents.insert(path.into(), document);
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.documents.get(path).map(|v| v.value().clone())
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("reads disabled".into()));
        }
        Ok(self.document(path))
    }

    async fn set_document(&self, path: &str, document: &Value) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("writes disabled".into()));
        }
        self.documents.insert(path.to_string(), document.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_engine::seed::{self, SEED_TENANT_ID};

    fn remote(docs: &Arc<MemoryDocumentStore>) -> TenantDocuments {
        TenantDocuments::new(docs.clone(), "main")
    }

    #[tokio::test]
    async fn state_lives_under_the_clinic_path() {
        let docs = MemoryDocumentStore::new_shared();
        let state = seed::default_state(7);
        remote(&docs).put(SEED_TENANT_ID, &state).await.unwrap();

        assert!(docs.document("tenants/demo-clinic/data/main").is_some());
        assert_eq!(remote(&docs).get(SEED_TENANT_ID).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn missing_everywhere_is_none() {
        let docs = MemoryDocumentStore::new_shared();
        assert!(remote(&docs).get("acme").await.unwrap().is_none());
        assert_eq!(docs.write_count(), 0);
    }

    #[tokio::test]
    async fn legacy_document_is_read_and_copied() {
        let docs = MemoryDocumentStore::new_shared();
        let mut legacy = seed::default_state(5);
        legacy.active_tenant = None;
        docs.insert("globalData/main", serde_json::to_value(&legacy).unwrap());

        let found = remote(&docs).get(SEED_TENANT_ID).await.unwrap();
        assert_eq!(found, Some(legacy));
        assert!(docs.document("tenants/demo-clinic/data/main").is_some());
        assert!(docs.document("globalData/main").is_some());
    }

    #[tokio::test]
    async fn legacy_document_of_another_clinic_is_ignored() {
        let docs = MemoryDocumentStore::new_shared();
        docs.insert(
            "globalData/main",
            serde_json::to_value(seed::default_state(5)).unwrap(),
        );
        assert!(remote(&docs).get("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn faults_surface_as_network_errors() {
        let docs = MemoryDocumentStore::new_shared();
        docs.fail_reads(true);
        assert!(matches!(
            remote(&docs).get(SEED_TENANT_ID).await,
            Err(RemoteError::Network(_))
        ));
    }

    #[tokio::test]
    async fn malformed_document_is_a_serialization_error() {
        let docs = MemoryDocumentStore::new_shared();
        docs.insert("tenants/acme/data/main", serde_json::json!({ "patients": 3 }));
        assert!(matches!(
            remote(&docs).get("acme").await,
            Err(RemoteError::Serialization(_))
        ));
    }
}
