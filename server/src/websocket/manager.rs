//! WebSocket connection manager.
//!
//! Tracks live connections per clinic and fans store changes out to the
//! connections of the clinic they belong to.

use std::sync::Arc;

use clinic_engine::{Change, ChangeListener};
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub sender: MessageSender,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
    /// Connection IDs per clinic.
    by_tenant: DashMap<String, Vec<String>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection. Returns the connection ID.
    pub fn register(&self, tenant_id: String, user_id: String, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.by_tenant
            .entry(tenant_id.clone())
            .or_default()
            .push(conn_id.clone());
        self.connections.insert(
            conn_id.clone(),
            Connection {
                id: conn_id.clone(),
                tenant_id,
                user_id,
                sender,
            },
        );

        tracing::info!(conn_id = %conn_id, "WebSocket connection registered");
        conn_id
    }

    pub fn unregister(&self, conn_id: &str) {
        if let Some((_, conn)) = self.connections.remove(conn_id) {
            if let Some(mut conn_ids) = self.by_tenant.get_mut(&conn.tenant_id) {
                conn_ids.retain(|id| id != conn_id);
                if conn_ids.is_empty() {
                    drop(conn_ids);
                    self.by_tenant.remove(&conn.tenant_id);
                }
            }

            tracing::info!(
                conn_id = %conn.id,
                tenant_id = %conn.tenant_id,
                user_id = %conn.user_id,
                "WebSocket connection unregistered"
            );
        }
    }

    /// Send a message to every connection of a clinic.
    ///
    /// Returns the number of connections that received the message.
    pub fn broadcast_to_tenant(&self, tenant_id: &str, message: ServerMessage) -> usize {
        let Some(conn_ids) = self.by_tenant.get(tenant_id).map(|ids| ids.clone()) else {
            return 0;
        };

        let mut sent_count = 0;
        for conn_id in conn_ids {
            if self.send_to(&conn_id, message.clone()) {
                sent_count += 1;
            }
        }
        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of clinics with at least one connection.
    pub fn tenant_count(&self) -> usize {
        self.by_tenant.len()
    }
}

impl ChangeListener for ConnectionManager {
    fn on_change(&self, change: &Change) {
        let sent = self.broadcast_to_tenant(
            &change.tenant_id,
            ServerMessage::Changed {
                change: change.clone(),
            },
        );
        tracing::debug!(
            tenant_id = %change.tenant_id,
            collection = change.collection,
            recipients = sent,
            "change broadcast"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_engine::ChangeKind;

    #[test]
    fn register_unregister() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.register("acme".into(), "u-1".into(), tx);
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.tenant_count(), 1);

        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.tenant_count(), 0);

        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn changes_reach_only_their_clinic() {
        let manager = ConnectionManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.register("acme".into(), "u-1".into(), tx1);
        manager.register("beta".into(), "u-2".into(), tx2);

        manager.on_change(&Change {
            tenant_id: "acme".into(),
            collection: "patients",
            id: "p-1".into(),
            kind: ChangeKind::Updated,
        });

        match rx1.try_recv().unwrap() {
            ServerMessage::Changed { change } => assert_eq!(change.id, "p-1"),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn closed_receivers_are_not_counted() {
        let manager = ConnectionManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.register("acme".into(), "u-1".into(), tx);
        drop(rx);
        assert_eq!(manager.broadcast_to_tenant("acme", ServerMessage::Pong), 0);
    }
}
