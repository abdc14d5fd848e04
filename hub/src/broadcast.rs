use crate::connection::{ConnectionId, ConnectionRegistry, SharedHandle};
use crate::message::{decode_payload, Envelope, EventType};
use log::*;
use std::fmt;
use std::sync::Arc;

/// Confirmation text carried by `connection` envelopes unless configured otherwise.
pub const DEFAULT_CONNECTED_MESSAGE: &str = "Connected to relay hub";

/// Owns the relay protocol on top of a [`ConnectionRegistry`].
///
/// Each method corresponds to one transport event and is a self-contained unit of work, so
/// events from different connections may be handed in concurrently from any number of tasks.
/// None of them fail: malformed input, stale ids and dead peers are logged and dropped.
pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
    connected_message: String,
}

impl BroadcastHub {
    pub fn new(connected_message: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            connected_message: connected_message.into(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a new connection, greet it, and return its id so the transport can tag all
    /// subsequent events with it.
    ///
    /// The greeting is queued before the connection is visible to peers, so it is always the
    /// first envelope the client receives.
    pub fn on_connect(&self, handle: SharedHandle) -> ConnectionId {
        let connection_id = self.registry.register(handle.clone(), |connection_id| {
            if handle.is_sendable() {
                let greeting =
                    Envelope::connection(*connection_id, self.connected_message.as_str());
                self.deliver(connection_id, &handle, &greeting);
            }
        });
        info!("Registered new connection {connection_id}");

        connection_id
    }

    /// Acknowledge a payload to its sender, then relay it to every other open connection.
    pub fn on_message(&self, connection_id: &ConnectionId, raw_payload: &str) {
        let data = match decode_payload(raw_payload) {
            Ok(data) => data,
            Err(e) => {
                warn!("Dropping malformed payload from connection {connection_id}: {e}");
                return;
            }
        };

        // The sender is presumably mid-teardown.
        let Some(sender) = self
            .registry
            .get(connection_id)
            .filter(|handle| handle.is_sendable())
        else {
            debug!("Dropping payload from unavailable connection {connection_id}");
            return;
        };

        self.deliver(connection_id, &sender, &Envelope::message(data.clone()));

        let recipients = self.registry.for_each_other(connection_id, |peer_id, peer| {
            self.deliver(peer_id, peer, &Envelope::broadcast(*connection_id, data.clone()));
        });

        debug!("Relayed payload from connection {connection_id} to {recipients} peer(s)");
    }

    pub fn on_close(&self, connection_id: &ConnectionId) {
        if self.registry.unregister(connection_id) {
            info!("Unregistered connection {connection_id}");
        }
    }

    /// Transport failure. Same state effect as a close.
    pub fn on_error<E: fmt::Display + ?Sized>(&self, connection_id: &ConnectionId, err: &E) {
        error!("Transport error on connection {connection_id}: {err}");
        self.on_close(connection_id);
    }

    fn deliver(&self, connection_id: &ConnectionId, handle: &SharedHandle, envelope: &Envelope) {
        let payload = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} envelope: {e}", envelope.event_type());
                return;
            }
        };

        if let Err(e) = handle.send(payload) {
            warn!(
                "Failed to send {} envelope to connection {connection_id}: {e}",
                envelope.event_type()
            );
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTED_MESSAGE)
    }
}
