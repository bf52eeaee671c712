use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use super::ServerEvent;

pub type ConnectionId = u64;

type Connections = HashMap<String, HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>;

/// Presence registry and fan-out point for socket events.
/// A user is online while at least one of their connections is registered.
pub struct Hub {
    connections: RwLock<Connections>,
    next_id: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection. The first connection of a user announces the
    /// new presence list to everyone; later ones only receive the list.
    pub async fn connect(
        &self,
        user_id: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connections = self.connections.write().await;
        let user_connections = connections.entry(user_id.to_string()).or_default();
        let first = user_connections.is_empty();
        user_connections.insert(id, tx.clone());

        let presence = ServerEvent::GetOnlineUsers(sorted_ids(&connections));
        if first {
            fan_out(&connections, &presence);
        } else {
            let _ = tx.send(presence);
        }
        tracing::info!(user_id, connection = id, first, "Socket connected");

        (id, rx)
    }

    /// Drop a connection. Announces presence when the user's last one goes.
    pub async fn disconnect(&self, user_id: &str, connection: ConnectionId) {
        let mut connections = self.connections.write().await;
        let Some(user_connections) = connections.get_mut(user_id) else {
            return;
        };
        user_connections.remove(&connection);
        if user_connections.is_empty() {
            connections.remove(user_id);
            let presence = ServerEvent::GetOnlineUsers(sorted_ids(&connections));
            fan_out(&connections, &presence);
        }
        tracing::info!(user_id, connection, "Socket disconnected");
    }

    pub async fn online_users(&self) -> Vec<String> {
        sorted_ids(&*self.connections.read().await)
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    /// Push an event to every connection of one user. Returns how many
    /// connections accepted it; 0 means the user is offline.
    pub async fn send_to(&self, user_id: &str, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let delivered = connections
            .get(user_id)
            .map(|conns| {
                conns
                    .values()
                    .filter(|tx| tx.send(event.clone()).is_ok())
                    .count()
            })
            .unwrap_or(0);
        if delivered == 0 {
            tracing::debug!(user_id, "No live sockets for event");
        }
        delivered
    }
}

fn sorted_ids(connections: &Connections) -> Vec<String> {
    let mut ids: Vec<String> = connections.keys().cloned().collect();
    ids.sort();
    ids
}

fn fan_out(connections: &Connections, event: &ServerEvent) {
    for tx in connections.values().flat_map(|conns| conns.values()) {
        let _ = tx.send(event.clone());
    }
}
