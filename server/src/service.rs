//! The data service.
//!
//! One [`DataService`] owns the engine [`Store`] for the life of the process
//! and performs all of its IO. Every mutation goes through the write-through
//! pipeline:
//!
//! 1. the engine applies it in memory (validate, replace, event, stamp),
//! 2. the whole state is written to local storage synchronously,
//! 3. a background task pushes the same state to the remote store.
//!
//! A failed local write is returned to the caller; a failed push is logged
//! and recorded in [`SyncStatus`], and the local copy wins at the next
//! reconciliation. Pushes are sequenced so an older state never overwrites
//! a newer one on the remote.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clinic_engine::seed::{self, SEED_TENANT_ID, SEED_TENANT_SLUG};
use clinic_engine::{
    reconcile, BackfillReport, ChangeListener, Clinic, ClinicState, Clock, Decision,
    ProfessionalInput, RemoteSnapshot, Store, Timestamp, User,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::{Authenticator, DisabledAuthenticator, Session, SessionRegistry};
use crate::config::DEV_BYPASS_PASSWORD;
use crate::error::{AppError, InitError};
use crate::storage::{LocalStore, LocalStoreError, RemoteError, RemoteStore};

/// How background and forced pushes behave.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Limit for a single remote call
    pub timeout: Duration,
    /// Extra attempts after a failed push
    pub max_retries: u32,
    /// Wait before the first retry; doubles on each further one
    pub retry_backoff: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Service behaviour switches.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub sync: SyncPolicy,
    /// Accept [`DEV_BYPASS_PASSWORD`] without the identity service
    pub insecure_dev_auth: bool,
}

/// Where sync stands, as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub remote_enabled: bool,
    pub active_tenant: Option<String>,
    pub last_modified: Option<Timestamp>,
    pub revision: u64,
    pub pending_pushes: usize,
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_push_error: Option<String>,
}

/// What loading a clinic did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub tenant_id: String,
    pub decision: Decision,
    pub backfill: BackfillReport,
}

/// Credentials for `login`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Clinic slug
    pub clinic: String,
    pub email: String,
    pub password: String,
}

/// A successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub clinic: Clinic,
}

#[derive(Debug, Default)]
struct PushTracker {
    /// Sequence number handed to the next push
    next_seq: u64,
    /// Highest sequence number known to be on the remote
    pushed_seq: u64,
    pending: usize,
    last_push_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    handles: Vec<JoinHandle<()>>,
}

/// Everything a push task needs, detached from the service.
#[derive(Clone)]
struct PushContext {
    remote: Arc<dyn RemoteStore>,
    policy: SyncPolicy,
    tracker: Arc<Mutex<PushTracker>>,
    /// Held for the duration of one remote write
    lane: Arc<Mutex<()>>,
    clock: Arc<dyn Clock>,
}

impl PushContext {
    /// Push `state` unless something newer already reached the remote.
    async fn run(&self, tenant_id: &str, state: &ClinicState, seq: u64) -> Result<(), RemoteError> {
        let _lane = self.lane.lock().await;
        if self.tracker.lock().await.pushed_seq > seq {
            tracing::debug!(tenant_id = %tenant_id, seq, "skipping superseded push");
            return Ok(());
        }

        let result = push_with_retry(self.remote.as_ref(), tenant_id, state, &self.policy).await;

        let mut tracker = self.tracker.lock().await;
        match &result {
            Ok(()) => {
                tracker.pushed_seq = tracker.pushed_seq.max(seq);
                tracker.last_push_at = Some(self.clock.now());
                tracker.last_error = None;
                tracing::debug!(tenant_id = %tenant_id, seq, "state pushed to remote");
            }
            Err(e) => {
                tracker.last_error = Some(e.to_string());
            }
        }
        result
    }
}

async fn push_with_retry(
    remote: &dyn RemoteStore,
    tenant_id: &str,
    state: &ClinicState,
    policy: &SyncPolicy,
) -> Result<(), RemoteError> {
    let mut attempt = 0;
    let mut backoff = policy.retry_backoff;
    loop {
        let result = match tokio::time::timeout(policy.timeout, remote.put(tenant_id, state)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(policy.timeout.as_millis() as u64)),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(tenant_id = %tenant_id, attempt, error = %e, "push failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The seed for a clinic nobody has stored yet.
fn seed_state(tenant_id: &str, known: Option<&Clinic>, now: Timestamp) -> ClinicState {
    match known {
        Some(clinic) => {
            let mut state = seed::seed_for(&clinic.id, &clinic.slug, &clinic.name, now);
            state.tenants.replace(clinic.clone());
            state
        }
        None if tenant_id == SEED_TENANT_ID => seed::default_state(now),
        None => seed::seed_for(tenant_id, tenant_id, tenant_id, now),
    }
}

/// Display name for a user created at first sign-in.
fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let words: Vec<String> = local
        .split(['.', '_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        email.to_string()
    } else {
        words.join(" ")
    }
}

fn ensure_active(store: &Store, tenant_id: &str) -> Result<(), AppError> {
    match store.active_tenant() {
        Some(active) if active == tenant_id => Ok(()),
        active => Err(AppError::TenantMismatch(active.unwrap_or_default().to_string())),
    }
}

/// Owner of the clinic state and its storage tiers.
pub struct DataService {
    store: RwLock<Store>,
    local: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    authenticator: Arc<dyn Authenticator>,
    sessions: SessionRegistry,
    clock: Arc<dyn Clock>,
    options: ServiceOptions,
    tracker: Arc<Mutex<PushTracker>>,
    lane: Arc<Mutex<()>>,
    /// Records of the inactive clinics held in the local blob
    parked: Mutex<ClinicState>,
}

impl DataService {
    /// A service with local storage only. Call [`DataService::initialize`]
    /// before serving requests.
    pub fn new(local: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RwLock::new(Store::new(clock.clone())),
            local,
            remote: None,
            authenticator: Arc::new(DisabledAuthenticator),
            sessions: SessionRegistry::new(),
            clock,
            options: ServiceOptions::default(),
            tracker: Arc::new(Mutex::new(PushTracker::default())),
            lane: Arc::new(Mutex::new(())),
            parked: Mutex::new(ClinicState::new()),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Observe every change the store makes.
    pub async fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.store.write().await.subscribe(listener);
    }

    fn push_context(&self) -> Option<PushContext> {
        self.remote.as_ref().map(|remote| PushContext {
            remote: remote.clone(),
            policy: self.options.sync.clone(),
            tracker: self.tracker.clone(),
            lane: self.lane.clone(),
            clock: self.clock.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    /// Load the starting clinic. Unusable local storage is fatal.
    pub async fn initialize(&self, preferred_tenant: Option<&str>) -> Result<LoadReport, InitError> {
        let local = self.local.load_all()?;
        let tenant_id = preferred_tenant
            .map(str::to_string)
            .or_else(|| local.as_ref().and_then(|s| s.active_tenant.clone()))
            .unwrap_or_else(|| SEED_TENANT_ID.to_string());

        tracing::info!(tenant_id = %tenant_id, remote = self.remote.is_some(), "loading clinic state");

        let remote = self.fetch_remote(&tenant_id).await;
        let mut store = self.store.write().await;
        let report = self.load(&mut store, &tenant_id, local, remote, None).await?;
        Ok(report)
    }

    /// Make `tenant_id` the active clinic, reconciling its state.
    ///
    /// Returns `None` when it already is. A clinic that is neither known to
    /// the current state nor stored remotely does not exist.
    pub async fn switch_tenant(&self, tenant_id: &str) -> Result<Option<LoadReport>, AppError> {
        if self.store.read().await.active_tenant() == Some(tenant_id) {
            return Ok(None);
        }

        // Let the outgoing clinic's writes land first.
        self.wait_for_pushes().await;

        let mut store = self.store.write().await;
        if store.active_tenant() == Some(tenant_id) {
            return Ok(None);
        }
        let known = match store.clinic(tenant_id) {
            Ok(clinic) => Some(clinic.clone()),
            Err(_) => self.parked.lock().await.tenants.get(tenant_id).cloned(),
        };
        let remote = self.fetch_remote(tenant_id).await;
        if known.is_none()
            && tenant_id != SEED_TENANT_ID
            && !matches!(remote, RemoteSnapshot::Found(_))
        {
            return Err(clinic_engine::Error::TenantNotFound(tenant_id.to_string()).into());
        }

        let local = self.local.load_all()?;
        tracing::info!(
            from = ?store.active_tenant(),
            to = %tenant_id,
            "switching active clinic"
        );
        let report = self.load(&mut store, tenant_id, local, remote, known).await?;
        Ok(Some(report))
    }

    async fn fetch_remote(&self, tenant_id: &str) -> RemoteSnapshot {
        let Some(remote) = &self.remote else {
            return RemoteSnapshot::Disabled;
        };
        match tokio::time::timeout(self.options.sync.timeout, remote.get(tenant_id)).await {
            Ok(Ok(Some(state))) => RemoteSnapshot::Found(state),
            Ok(Ok(None)) => RemoteSnapshot::Empty,
            Ok(Err(e)) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "remote read failed, continuing locally");
                RemoteSnapshot::Unreachable(e.to_string())
            }
            Err(_) => {
                tracing::warn!(tenant_id = %tenant_id, "remote read timed out, continuing locally");
                RemoteSnapshot::Unreachable("timed out".into())
            }
        }
    }

    async fn load(
        &self,
        store: &mut Store,
        tenant_id: &str,
        local: Option<ClinicState>,
        remote: RemoteSnapshot,
        known: Option<Clinic>,
    ) -> Result<LoadReport, LocalStoreError> {
        let reclaimed = local
            .as_ref()
            .is_some_and(|blob| blob.active_tenant.as_deref() != Some(tenant_id));
        let (local, parked) = match local {
            Some(blob) => blob.split_tenant(tenant_id),
            None => (None, ClinicState::new()),
        };
        *self.parked.lock().await = parked;

        let now = self.clock.now_millis();
        let outcome = reconcile(tenant_id, local, remote, now, || {
            seed_state(tenant_id, known.as_ref(), now)
        });

        store.replace_state(outcome.state);
        if outcome.persist_local || reclaimed {
            self.save_local(store.state()).await?;
        }
        if outcome.push_local {
            self.spawn_push(store).await;
        }

        let backfill = store.run_event_backfill(tenant_id);
        if !backfill.skipped {
            tracing::info!(
                tenant_id = %tenant_id,
                patients = backfill.patients,
                events = backfill.events,
                "event history backfilled"
            );
            self.save_local(store.state()).await?;
            self.spawn_push(store).await;
        }

        Ok(LoadReport {
            tenant_id: tenant_id.to_string(),
            decision: outcome.decision,
            backfill,
        })
    }

    // ---------------------------------------------------------------------
    // Write-through pipeline
    // ---------------------------------------------------------------------

    /// Run a read against the caller's clinic.
    pub async fn read<T, F>(&self, session: &Session, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Store, &str) -> clinic_engine::error::Result<T>,
    {
        let store = self.store.read().await;
        ensure_active(&store, &session.tenant_id)?;
        Ok(f(&*store, &session.tenant_id)?)
    }

    /// Apply a mutation for the caller's clinic and persist it.
    ///
    /// Whatever the mutation changed is persisted even when it returns an
    /// error, so a compensated failure reaches storage as well.
    pub async fn mutate<T, F>(&self, session: &Session, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Store, &str) -> clinic_engine::error::Result<T>,
    {
        let mut store = self.store.write().await;
        ensure_active(&store, &session.tenant_id)?;

        store.set_actor(Some(session.user_id.clone()));
        let before = store.revision();
        let result = f(&mut *store, &session.tenant_id);
        store.set_actor(None);

        let persisted = if store.revision() != before {
            self.persist(&store).await
        } else {
            Ok(())
        };
        let value = result?;
        persisted?;
        Ok(value)
    }

    /// Write the active clinic's state together with the parked clinics.
    async fn save_local(&self, state: &ClinicState) -> Result<(), LocalStoreError> {
        let parked = self.parked.lock().await;
        if parked.is_empty() {
            return self.local.save_all(state);
        }
        let mut blob = state.clone();
        blob.absorb_parked(&parked);
        self.local.save_all(&blob)
    }

    async fn persist(&self, store: &Store) -> Result<(), LocalStoreError> {
        let saved = self.save_local(store.state()).await;
        if let Err(e) = &saved {
            tracing::error!(error = %e, "local save failed; change is held in memory only");
        }
        self.spawn_push(store).await;
        saved
    }

    async fn spawn_push(&self, store: &Store) {
        let Some(ctx) = self.push_context() else {
            return;
        };
        let Some(tenant_id) = store.active_tenant().map(str::to_string) else {
            return;
        };
        let state = store.state().clone();

        let mut tracker = self.tracker.lock().await;
        tracker.next_seq += 1;
        let seq = tracker.next_seq;
        tracker.pending += 1;
        tracker.handles.retain(|h| !h.is_finished());

        let handle = tokio::spawn(async move {
            if let Err(e) = ctx.run(&tenant_id, &state, seq).await {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "background push failed; local copy is kept"
                );
            }
            let mut tracker = ctx.tracker.lock().await;
            tracker.pending = tracker.pending.saturating_sub(1);
        });
        tracker.handles.push(handle);
    }

    /// Wait for every background push started so far.
    pub async fn wait_for_pushes(&self) {
        let handles = std::mem::take(&mut self.tracker.lock().await.handles);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "push task ended abnormally");
            }
        }
    }

    /// Save locally and push to the remote now, surfacing any failure.
    pub async fn force_sync(&self, session: &Session) -> Result<SyncStatus, AppError> {
        let ctx = self.push_context().ok_or(AppError::SyncDisabled)?;

        let (state, seq) = {
            let store = self.store.read().await;
            ensure_active(&store, &session.tenant_id)?;
            let mut tracker = self.tracker.lock().await;
            tracker.next_seq += 1;
            (store.state().clone(), tracker.next_seq)
        };

        self.save_local(&state).await?;
        ctx.run(&session.tenant_id, &state, seq).await?;
        tracing::info!(tenant_id = %session.tenant_id, "forced sync completed");
        Ok(self.sync_status().await)
    }

    pub async fn sync_status(&self) -> SyncStatus {
        let store = self.store.read().await;
        let tracker = self.tracker.lock().await;
        SyncStatus {
            remote_enabled: self.remote.is_some(),
            active_tenant: store.active_tenant().map(str::to_string),
            last_modified: store.state().last_modified,
            revision: store.revision(),
            pending_pushes: tracker.pending,
            last_push_at: tracker.last_push_at,
            last_push_error: tracker.last_error.clone(),
        }
    }

    // ---------------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------------

    /// Sign a user in to a clinic, making it the active one.
    ///
    /// With `insecure_dev_auth` on, [`DEV_BYPASS_PASSWORD`] skips the identity
    /// service. An email with no user in the clinic gets a new Professional
    /// user and profile.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        let email = request.email.trim().to_lowercase();
        let slug = request.clinic.trim().to_lowercase();
        if email.is_empty() || slug.is_empty() {
            return Err(AppError::BadRequest("clinic and email are required".into()));
        }

        if self.options.insecure_dev_auth && request.password == DEV_BYPASS_PASSWORD {
            tracing::warn!(email = %email, clinic = %slug, "development sign-in bypass used");
        } else {
            let identity = self.authenticator.sign_in(&email, &request.password).await?;
            tracing::debug!(subject = %identity.subject, "identity verified");
        }

        let tenant_id = self.resolve_tenant(&slug).await;
        self.switch_tenant(&tenant_id).await?;

        let mut store = self.store.write().await;
        ensure_active(&store, &tenant_id)?;
        let before = store.revision();

        let user = match store.find_user_by_email(&tenant_id, &email).cloned() {
            Some(user) => user,
            None => {
                let (professional, user) = store.create_professional(
                    &tenant_id,
                    ProfessionalInput {
                        name: name_from_email(&email),
                        email: Some(email.clone()),
                        ..Default::default()
                    },
                )?;
                tracing::info!(
                    tenant_id = %tenant_id,
                    professional_id = %professional.id,
                    "created professional at first sign-in"
                );
                user.ok_or_else(|| AppError::Internal("professional created without a login".into()))?
            }
        };
        let clinic = store.clinic(&tenant_id)?.clone();

        if store.revision() != before {
            self.persist(&store).await?;
        }

        let session = Session::for_user(&user, self.clock.now());
        let token = session.token.clone();
        self.sessions.insert(session);
        tracing::info!(tenant_id = %tenant_id, user_id = %user.id, role = ?user.role, "signed in");

        Ok(LoginResponse {
            token,
            user,
            clinic,
        })
    }

    async fn resolve_tenant(&self, slug: &str) -> String {
        let store = self.store.read().await;
        match store.clinic_by_slug(slug) {
            Some(clinic) => clinic.id.clone(),
            None if slug == SEED_TENANT_SLUG => SEED_TENANT_ID.to_string(),
            None => slug.to_string(),
        }
    }

    pub fn logout(&self, token: &str) -> Option<Session> {
        self.sessions.revoke(token)
    }
}
