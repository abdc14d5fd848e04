use crate::error::Error;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::*;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Unique identifier for a connection (server-generated, 122 random bits via UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// The send-capable side of one client transport.
///
/// Implementations must never block: `send` enqueues or fails immediately, so the hub can call
/// it for every peer of a fan-out without stalling on a slow client.
pub trait ConnectionHandle: Send + Sync + fmt::Debug {
    /// Queue a serialized envelope for delivery to the remote peer.
    fn send(&self, payload: String) -> Result<(), Error>;

    fn state(&self) -> ConnectionState;

    /// Transition to `Closed`. Idempotent.
    fn close(&self);

    fn is_sendable(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

pub type SharedHandle = Arc<dyn ConnectionHandle>;

/// Handle backed by an unbounded channel drained by the connection's writer task.
///
/// The handle reports `Closed` once it has been explicitly closed or once the writer task has
/// dropped the receiving half (the socket could not be written to).
#[derive(Debug)]
pub struct ChannelHandle {
    sender: UnboundedSender<String>,
    open: AtomicBool,
}

impl ChannelHandle {
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self {
            sender,
            open: AtomicBool::new(true),
        }
    }

    /// Create a handle together with the receiver its writer task should drain.
    pub fn channel() -> (Arc<Self>, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }
}

impl ConnectionHandle for ChannelHandle {
    fn send(&self, payload: String) -> Result<(), Error> {
        if !self.is_sendable() {
            return Err(Error::peer_unavailable());
        }
        self.sender
            .send(payload)
            .map_err(|_closed| Error::peer_unavailable())
    }

    fn state(&self) -> ConnectionState {
        if self.open.load(Ordering::Acquire) && !self.sender.is_closed() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Registry of every open connection, keyed by its server-assigned id.
///
/// Membership is guarded by `DashMap`'s sharded locks. No handle is ever called while a shard
/// lock is held: iteration takes a snapshot first, so slow peers cannot stall registration or
/// removal of others.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, SharedHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a handle under a fresh id - O(1)
    ///
    /// `on_reserved` runs once the id is chosen and before the entry becomes visible to `get`
    /// or `for_each_other`, so anything it queues on the handle precedes all peer traffic. No
    /// map lock is held while it runs. It runs again with a new id only if a concurrent
    /// registration claimed the same id in between.
    pub fn register<F>(&self, handle: SharedHandle, mut on_reserved: F) -> ConnectionId
    where
        F: FnMut(&ConnectionId),
    {
        loop {
            let connection_id = ConnectionId::new();
            if self.connections.contains_key(&connection_id) {
                warn!("Connection id collision on {connection_id}, regenerating");
                continue;
            }

            on_reserved(&connection_id);

            // Never overwrite a live entry.
            if let Entry::Vacant(slot) = self.connections.entry(connection_id) {
                slot.insert(handle);
                return connection_id;
            }
            warn!("Connection id {connection_id} claimed concurrently, regenerating");
        }
    }

    /// Unregister a connection - O(1). Returns whether an entry was actually removed.
    ///
    /// The removed handle is transitioned to `Closed` so that any fan-out still holding a
    /// snapshot of it will skip it.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        match self.connections.remove(connection_id) {
            Some((_, handle)) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<SharedHandle> {
        self.connections
            .get(connection_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Visit every sendable connection except `exclude` - O(n). Returns the number visited.
    ///
    /// Entries are snapshotted before `f` runs, so `f` may freely call back into the registry.
    pub fn for_each_other<F>(&self, exclude: &ConnectionId, mut f: F) -> usize
    where
        F: FnMut(&ConnectionId, &SharedHandle),
    {
        let peers: Vec<(ConnectionId, SharedHandle)> = self
            .connections
            .iter()
            .filter(|entry| entry.key() != exclude && entry.value().is_sendable())
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (connection_id, handle) in &peers {
            f(connection_id, handle);
        }

        peers.len()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn open_handle() -> (SharedHandle, UnboundedReceiver<String>) {
        let (handle, rx) = ChannelHandle::channel();
        let handle: SharedHandle = handle;
        (handle, rx)
    }

    #[test]
    fn test_register_increases_size_and_is_retrievable() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();

        let id = registry.register(handle, |_| {});

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn test_register_hook_runs_before_entry_is_visible() {
        let registry = ConnectionRegistry::new();
        let (existing, _rx_existing) = open_handle();
        let existing_id = registry.register(existing, |_| {});
        let (handle, _rx) = open_handle();

        let mut reserved = None;
        let id = registry.register(handle, |id| {
            assert!(registry.get(id).is_none());
            let visited = registry.for_each_other(&existing_id, |_, _| {});
            assert_eq!(visited, 0);
            reserved = Some(*id);
        });

        assert_eq!(reserved, Some(id));
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();
        let id = registry.register(handle, |_| {});

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_unregister_unknown_id_is_noop() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();
        registry.register(handle, |_| {});

        assert!(!registry.unregister(&ConnectionId::new()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_closes_removed_handle() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();
        let id = registry.register(Arc::clone(&handle), |_| {});

        registry.unregister(&id);

        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(handle.send("late".to_string()).is_err());
    }

    #[test]
    fn test_ids_unique_across_ten_thousand_registrations() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = open_handle();

        let ids: HashSet<ConnectionId> = (0..10_000)
            .map(|_| registry.register(Arc::clone(&handle), |_| {}))
            .collect();

        assert_eq!(ids.len(), 10_000);
        assert_eq!(registry.len(), 10_000);
    }

    #[test]
    fn test_for_each_other_excludes_sender() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = open_handle();
        let (b, _rx_b) = open_handle();
        let (c, _rx_c) = open_handle();
        let id_a = registry.register(a, |_| {});
        let id_b = registry.register(b, |_| {});
        let id_c = registry.register(c, |_| {});

        let mut visited = HashSet::new();
        let count = registry.for_each_other(&id_a, |id, _| {
            visited.insert(*id);
        });

        assert_eq!(count, 2);
        assert_eq!(visited, HashSet::from([id_b, id_c]));
    }

    #[test]
    fn test_for_each_other_skips_unsendable_without_evicting() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = open_handle();
        let (b, rx_b) = open_handle();
        let id_a = registry.register(a, |_| {});
        let _id_b = registry.register(b, |_| {});

        // Writer side gone: transport no longer accepts writes.
        drop(rx_b);

        let count = registry.for_each_other(&id_a, |_, _| panic!("must not visit"));

        assert_eq!(count, 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_for_each_other_tolerates_reentrant_unregister() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = open_handle();
        let (b, _rx_b) = open_handle();
        let (c, _rx_c) = open_handle();
        let id_a = registry.register(a, |_| {});
        registry.register(b, |_| {});
        registry.register(c, |_| {});

        let count = registry.for_each_other(&id_a, |id, _| {
            registry.unregister(id);
        });

        assert_eq!(count, 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id_a).is_some());
    }

    #[test]
    fn test_channel_handle_reports_closed_after_close() {
        let (handle, _rx) = ChannelHandle::channel();
        assert!(handle.is_sendable());

        handle.close();
        handle.close();

        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connection_id_serializes_as_plain_string() {
        let id = ConnectionId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
