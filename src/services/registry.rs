use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::notifications::Event;

pub type ConnectionId = Uuid;

#[derive(Clone)]
struct Connection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Event>,
}

/// Live real-time connections, at most one per user.
///
/// Process-local and not persisted: clients register again after reconnecting.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<i64, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `user_id` to this connection, replacing any earlier one.
    /// Returns the replaced connection id.
    pub fn register(
        &self,
        user_id: i64,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<Event>,
    ) -> Option<ConnectionId> {
        let previous = self.connections.insert(
            user_id,
            Connection {
                id: connection_id,
                sender,
            },
        );

        log::info!("User {} registered connection {}", user_id, connection_id);
        previous.map(|c| c.id)
    }

    /// Drops every mapping that still points at `connection_id`. One socket
    /// may have registered several users. Returns the users it served.
    pub fn remove_connection(&self, connection_id: ConnectionId) -> Vec<i64> {
        let mut removed = Vec::new();
        self.connections.retain(|user_id, connection| {
            if connection.id == connection_id {
                removed.push(*user_id);
                false
            } else {
                true
            }
        });

        for user_id in &removed {
            log::info!("Removed connection {} of user {}", connection_id, user_id);
        }
        removed
    }

    pub fn connection_for(&self, user_id: i64) -> Option<ConnectionId> {
        self.connections.get(&user_id).map(|c| c.id)
    }

    /// Pushes `event` to the user's live connection. Returns `false` when the
    /// user has none; nothing is queued.
    pub fn emit_to_user(&self, user_id: i64, event: &str, payload: serde_json::Value) -> bool {
        let Some(connection) = self.connections.get(&user_id).map(|c| c.clone()) else {
            return false;
        };

        let frame = Event {
            event: event.to_string(),
            payload,
        };
        if connection.sender.send(frame).is_err() {
            log::debug!(
                "Connection {} of user {} is gone, dropping it",
                connection.id,
                user_id
            );
            self.connections
                .remove_if(&user_id, |_, current| current.id == connection.id);
            return false;
        }

        true
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_registration_wins() {
        let registry = ConnectionRegistry::new();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert_eq!(registry.register(1, first, first_tx), None);
        assert_eq!(registry.register(1, second, second_tx), Some(first));
        assert!(registry.emit_to_user(1, "notification", json!({"n": 1})));

        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().unwrap().payload, json!({"n": 1}));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_removal_keeps_newer_registration() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        registry.register(5, old, tx.clone());
        registry.register(5, new, tx);

        assert!(registry.remove_connection(old).is_empty());
        assert_eq!(registry.connection_for(5), Some(new));
        assert_eq!(registry.remove_connection(new), vec![5]);
        assert!(registry.is_empty());
    }

    #[test]
    fn removal_drops_every_user_on_the_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let shared = Uuid::new_v4();
        let other = Uuid::new_v4();
        registry.register(1, shared, tx.clone());
        registry.register(2, shared, tx.clone());
        registry.register(3, shared, tx.clone());
        registry.register(4, other, tx);

        let mut removed = registry.remove_connection(shared);
        removed.sort();

        assert_eq!(removed, vec![1, 2, 3]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.connection_for(4), Some(other));
    }

    #[test]
    fn emit_without_connection_is_skipped() {
        let registry = ConnectionRegistry::new();

        assert!(!registry.emit_to_user(9, "notification", json!({})));
    }

    #[test]
    fn closed_receiver_is_pruned_on_emit() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(3, Uuid::new_v4(), tx);
        drop(rx);

        assert!(!registry.emit_to_user(3, "notification", json!({})));
        assert!(registry.connection_for(3).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_is_safe() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();
        for user_id in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::unbounded_channel();
                let connection = Uuid::new_v4();
                registry.register(user_id, connection, tx);
                if user_id % 2 == 0 {
                    registry.remove_connection(connection);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len(), 32);
        assert!(registry.connection_for(1).is_some());
        assert!(registry.connection_for(2).is_none());
    }
}
