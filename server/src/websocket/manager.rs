//! WebSocket connection manager.
//!
//! Tracks active WebSocket connections and which collections each one
//! subscribes to, and fans snapshots out to subscribers.
//!
//! Snapshot reads for one collection are serialized with
//! [`ConnectionManager::lock_collection`] and stamped from a strictly
//! increasing clock, and a connection never receives a snapshot older than
//! one it already has. Subscribers therefore always end on the latest read.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use daybook_engine::{Snapshot, Timestamp};
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Identifier the client announced, or the connection id
    pub client_id: String,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
    /// Subscribed collections and the read time of the newest snapshot sent
    pub collections: HashMap<String, Option<Timestamp>>,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
    /// Subscribed connection IDs, keyed by collection.
    subscribers: DashMap<String, HashSet<String>>,
    /// Per-collection lock held across snapshot read and delivery.
    publish_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Last read time handed out.
    read_clock: AtomicI64,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection.
    ///
    /// Returns the connection ID.
    pub fn register(&self, client_id: Option<String>, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let client_id = client_id.unwrap_or_else(|| conn_id.clone());

        self.connections.insert(
            conn_id.clone(),
            Connection {
                id: conn_id.clone(),
                client_id: client_id.clone(),
                sender,
                collections: HashMap::new(),
            },
        );

        tracing::info!(conn_id = %conn_id, client_id = %client_id, "WebSocket connection registered");

        conn_id
    }

    /// Unregister a connection, releasing all of its subscriptions.
    pub fn unregister(&self, conn_id: &str) {
        if let Some((_, conn)) = self.connections.remove(conn_id) {
            for collection in conn.collections.keys() {
                self.remove_subscriber(collection, conn_id);
            }

            tracing::info!(
                conn_id = %conn.id,
                client_id = %conn.client_id,
                released = conn.collections.len(),
                "WebSocket connection unregistered"
            );
        }
    }

    /// Subscribe a connection to a collection.
    ///
    /// Returns `false` if the connection is unknown.
    pub fn subscribe(&self, conn_id: &str, collection: &str) -> bool {
        let Some(mut conn) = self.connections.get_mut(conn_id) else {
            return false;
        };
        conn.collections.entry(collection.to_string()).or_insert(None);
        drop(conn);

        self.subscribers
            .entry(collection.to_string())
            .or_default()
            .insert(conn_id.to_string());

        tracing::debug!(conn_id = %conn_id, collection = %collection, "Subscribed");
        true
    }

    /// Unsubscribe a connection from a collection.
    ///
    /// Returns whether the connection was subscribed.
    pub fn unsubscribe(&self, conn_id: &str, collection: &str) -> bool {
        let removed = self
            .connections
            .get_mut(conn_id)
            .map(|mut conn| conn.collections.remove(collection).is_some())
            .unwrap_or(false);

        if removed {
            self.remove_subscriber(collection, conn_id);
            tracing::debug!(conn_id = %conn_id, collection = %collection, "Unsubscribed");
        }
        removed
    }

    fn remove_subscriber(&self, collection: &str, conn_id: &str) {
        if let Some(mut ids) = self.subscribers.get_mut(collection) {
            ids.remove(conn_id);
            if ids.is_empty() {
                drop(ids);
                self.subscribers.remove_if(collection, |_, ids| ids.is_empty());
            }
        }
    }

    /// Wait for exclusive use of a collection's snapshot stream.
    ///
    /// Hold the guard from the snapshot read until it has been delivered.
    pub async fn lock_collection(&self, collection: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .publish_locks
            .entry(collection.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Read time for the next snapshot: the current time in epoch
    /// milliseconds, bumped past the previous stamp if the clock has not
    /// moved on.
    pub fn next_read_time(&self) -> Timestamp {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.read_clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.read_clock.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    /// Send a snapshot to one subscribed connection.
    ///
    /// Returns `false` if the connection is gone, not subscribed to the
    /// snapshot's collection, or already holds a newer snapshot.
    pub fn deliver_snapshot(&self, conn_id: &str, snapshot: Snapshot) -> bool {
        let Some(mut conn) = self.connections.get_mut(conn_id) else {
            return false;
        };
        let Some(delivered) = conn.collections.get_mut(&snapshot.collection) else {
            return false;
        };

        if delivered.is_some_and(|last| snapshot.read_time <= last) {
            tracing::debug!(
                conn_id = %conn_id,
                collection = %snapshot.collection,
                read_time = snapshot.read_time,
                "Dropped stale snapshot"
            );
            return false;
        }
        *delivered = Some(snapshot.read_time);

        conn.sender.send(ServerMessage::snapshot(snapshot)).is_ok()
    }

    /// Send a snapshot to every subscriber of its collection.
    ///
    /// Returns the number of connections that received it.
    pub fn broadcast_snapshot(&self, snapshot: Snapshot) -> usize {
        let recipients: Vec<String> = match self.subscribers.get(&snapshot.collection) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return 0,
        };

        let sent_count = recipients
            .iter()
            .filter(|conn_id| self.deliver_snapshot(conn_id, snapshot.clone()))
            .count();

        tracing::debug!(
            collection = %snapshot.collection,
            recipients = sent_count,
            "Broadcast snapshot to subscribers"
        );

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Whether anyone subscribes to a collection.
    pub fn has_subscribers(&self, collection: &str) -> bool {
        self.subscribers.contains_key(collection)
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of subscribers of a collection.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.subscribers
            .get(collection)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(collection: &str, read_time: Timestamp) -> Snapshot {
        Snapshot {
            collection: collection.to_string(),
            documents: Vec::new(),
            read_time,
        }
    }

    fn read_time_of(msg: ServerMessage) -> Timestamp {
        match msg {
            ServerMessage::Snapshot { snapshot } => snapshot.read_time,
            other => panic!("Expected Snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_register_unregister() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(Some("phone".to_string()), tx);
        assert_eq!(manager.connection_count(), 1);

        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_only_subscribers() {
        let manager = ConnectionManager::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let conn1 = manager.register(None, tx1);
        let conn2 = manager.register(None, tx2);
        assert!(manager.subscribe(&conn1, "todos"));
        assert!(manager.subscribe(&conn2, "notes"));

        let sent = manager.broadcast_snapshot(snapshot("todos", 10));
        assert_eq!(sent, 1);

        assert_eq!(read_time_of(rx1.try_recv().unwrap()), 10);
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_out_of_order_snapshots_are_dropped() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(None, tx);
        manager.subscribe(&conn_id, "todos");

        // The newer read finishes first
        assert_eq!(manager.broadcast_snapshot(snapshot("todos", 20)), 1);
        assert_eq!(manager.broadcast_snapshot(snapshot("todos", 10)), 0);
        assert!(!manager.deliver_snapshot(&conn_id, snapshot("todos", 20)));
        assert!(manager.deliver_snapshot(&conn_id, snapshot("todos", 30)));

        assert_eq!(read_time_of(rx.try_recv().unwrap()), 20);
        assert_eq!(read_time_of(rx.try_recv().unwrap()), 30);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_check_is_per_collection() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(None, tx);
        manager.subscribe(&conn_id, "todos");
        manager.subscribe(&conn_id, "notes");

        assert!(manager.deliver_snapshot(&conn_id, snapshot("todos", 50)));
        assert!(manager.deliver_snapshot(&conn_id, snapshot("notes", 5)));
        assert!(!manager.deliver_snapshot(&conn_id, snapshot("events", 60)));

        assert_eq!(read_time_of(rx.try_recv().unwrap()), 50);
        assert_eq!(read_time_of(rx.try_recv().unwrap()), 5);
    }

    #[test]
    fn test_read_times_strictly_increase() {
        let manager = ConnectionManager::new();
        let stamps: Vec<Timestamp> = (0..100).map(|_| manager.next_read_time()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_lock_collection_serializes_publishers() {
        let manager = ConnectionManager::new_shared();
        let guard = manager.lock_collection("todos").await;

        let other = Arc::clone(&manager);
        let waiter = tokio::spawn(async move {
            let _guard = other.lock_collection("todos").await;
        });

        // A different collection is not blocked
        let notes = tokio::time::timeout(Duration::from_millis(50), manager.lock_collection("notes"))
            .await;
        assert!(notes.is_ok());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_unregister_releases_subscriptions() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(None, tx);
        manager.subscribe(&conn_id, "todos");
        manager.subscribe(&conn_id, "notes");
        assert_eq!(manager.subscriber_count("todos"), 1);

        manager.unregister(&conn_id);
        assert!(!manager.has_subscribers("todos"));
        assert!(!manager.has_subscribers("notes"));
        assert_eq!(manager.broadcast_snapshot(snapshot("todos", 1)), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(None, tx);
        manager.subscribe(&conn_id, "todos");

        assert!(manager.unsubscribe(&conn_id, "todos"));
        assert!(!manager.unsubscribe(&conn_id, "todos"));
        assert_eq!(manager.broadcast_snapshot(snapshot("todos", 1)), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_subscribe_unknown_connection() {
        let manager = ConnectionManager::new();
        assert!(!manager.subscribe("missing", "todos"));
        assert!(!manager.has_subscribers("todos"));
    }
}
