//! Bearer sessions handed out at login.

use chrono::{DateTime, Utc};
use clinic_engine::{AccessScope, Role, User};
use dashmap::DashMap;
use serde::Serialize;

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub tenant_id: String,
    pub role: Role,
    pub professional_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn for_user(user: &User, created_at: DateTime<Utc>) -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            tenant_id: user.clinic_id.clone(),
            role: user.role,
            professional_id: user.professional_id.clone(),
            created_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// The listing lens this session gets.
    pub fn scope(&self) -> AccessScope {
        if self.is_admin() {
            AccessScope::administrative()
        } else {
            AccessScope::professional(self.professional_id.clone())
        }
    }
}

/// Live sessions, keyed by token.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        tracing::debug!(user_id = %session.user_id, tenant_id = %session.tenant_id, "session opened");
        self.sessions.insert(session.token.clone(), session);
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|s| s.value().clone())
    }

    pub fn revoke(&self, token: &str) -> Option<Session> {
        self.sessions.remove(token).map(|(_, s)| s)
    }

    /// Drop every session of a user, e.g. after the user was deleted.
    pub fn revoke_user(&self, user_id: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_engine::AccessMode;

    fn user(role: Role) -> User {
        User {
            id: "u-1".into(),
            clinic_id: "acme".into(),
            name: "Rita".into(),
            email: "rita@acme.clinic".into(),
            credential_ref: None,
            role,
            professional_id: Some("p-1".into()),
        }
    }

    #[test]
    fn professional_sessions_are_scoped() {
        let session = Session::for_user(&user(Role::Professional), Utc::now());
        let scope = session.scope();
        assert_eq!(scope.mode, AccessMode::Professional);
        assert_eq!(scope.professional_id.as_deref(), Some("p-1"));
        assert_eq!(
            Session::for_user(&user(Role::ClinicAdmin), Utc::now()).scope(),
            AccessScope::administrative()
        );
    }

    #[test]
    fn revoke_by_token_and_by_user() {
        let registry = SessionRegistry::new();
        let a = Session::for_user(&user(Role::Professional), Utc::now());
        let b = Session::for_user(&user(Role::Professional), Utc::now());
        registry.insert(a.clone());
        registry.insert(b);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.revoke(&a.token), Some(a));
        assert_eq!(registry.revoke_user("u-1"), 1);
        assert!(registry.is_empty());
    }
}
