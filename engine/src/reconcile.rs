//! Choosing between the local and the remote copy of a clinic's state.
//!
//! Runs at startup and whenever the active clinic changes. The decision is
//! whole-state and timestamp-gated: exactly one copy wins, nothing is merged.
//!
//! # Algorithm
//!
//! 1. The local side is the clinic's own view of the stored blob (see
//!    [`ClinicState::split_tenant`]). A view claimed by a different clinic is
//!    ignored.
//! 2. A local blob without `lastModified` counts as written now; a remote one
//!    without it counts as written at the epoch.
//! 3. Local wins only when it is strictly newer and does not look like the
//!    untouched seed. The winner is pushed back to the remote.
//! 4. Otherwise the remote copy is adopted and written to local storage.
//! 5. With no remote copy the local blob is kept; with neither, the clinic is
//!    seeded and the seed persisted locally.
//!
//! Concurrent edits on two devices lose the older device's changes. That is a
//! known property of this policy.

use crate::state::ClinicState;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What the remote tier returned for the clinic.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSnapshot {
    /// Remote sync is not configured
    Disabled,
    /// The read failed; the message is kept for logging
    Unreachable(String),
    /// Reachable, but nothing stored for this clinic
    Empty,
    Found(ClinicState),
}

/// Which copy won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Local is newer and holds real data
    KeptLocal,
    /// Remote is newer, or local is only the seed
    AdoptedRemote,
    /// No remote copy to compare against
    LocalOnly,
    /// Nothing anywhere; the seed was loaded
    Seeded,
}

/// Result of reconciliation, and what the caller must do next.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub state: ClinicState,
    pub decision: Decision,
    /// Push `state` to the remote tier
    pub push_local: bool,
    /// Write `state` to local storage
    pub persist_local: bool,
}

/// Decide which copy of `tenant_id`'s state to load.
///
/// `seed` is only called when neither tier has anything.
pub fn reconcile<F>(
    tenant_id: &str,
    local: Option<ClinicState>,
    remote: RemoteSnapshot,
    now: Timestamp,
    seed: F,
) -> ReconcileOutcome
where
    F: FnOnce() -> ClinicState,
{
    let local = local.filter(|state| {
        state
            .active_tenant
            .as_deref()
            .map_or(true, |owner| owner == tenant_id)
    });
    let remote_reachable = !matches!(
        remote,
        RemoteSnapshot::Disabled | RemoteSnapshot::Unreachable(_)
    );

    let outcome = match (local, remote) {
        (Some(local), RemoteSnapshot::Found(remote)) => {
            let local_ts = local.last_modified.unwrap_or(now);
            let remote_ts = remote.last_modified.unwrap_or(0);
            if local_ts > remote_ts && !local.looks_freshly_seeded() {
                ReconcileOutcome {
                    state: claim(local, tenant_id),
                    decision: Decision::KeptLocal,
                    push_local: true,
                    persist_local: false,
                }
            } else {
                ReconcileOutcome {
                    state: claim(remote, tenant_id),
                    decision: Decision::AdoptedRemote,
                    push_local: false,
                    persist_local: true,
                }
            }
        }
        (None, RemoteSnapshot::Found(remote)) => ReconcileOutcome {
            state: claim(remote, tenant_id),
            decision: Decision::AdoptedRemote,
            push_local: false,
            persist_local: true,
        },
        (Some(local), _) => ReconcileOutcome {
            state: claim(local, tenant_id),
            decision: Decision::LocalOnly,
            push_local: remote_reachable,
            persist_local: false,
        },
        (None, _) => {
            let mut state = claim(seed(), tenant_id);
            state.last_modified = Some(now);
            ReconcileOutcome {
                state,
                decision: Decision::Seeded,
                push_local: remote_reachable,
                persist_local: true,
            }
        }
    };

    info!(
        tenant_id = %tenant_id,
        decision = ?outcome.decision,
        push_local = outcome.push_local,
        "reconciled clinic state"
    );
    outcome
}

fn claim(mut state: ClinicState, tenant_id: &str) -> ClinicState {
    state.active_tenant = Some(tenant_id.to_string());
    state
}
