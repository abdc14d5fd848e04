//! Connection registry and broadcast fan-out for the real-time relay.
//!
//! Clients hold one long-lived bidirectional connection. Every payload a client sends is
//! acknowledged back to it and relayed to every other connected client.
//!
//! # Architecture
//!
//! - **Transport-agnostic core**: the hub never touches sockets. The transport layer wraps each
//!   accepted connection in a [`ConnectionHandle`] (usually a [`ChannelHandle`] whose queue is
//!   drained by a writer task) and feeds connect/message/close/error events in.
//! - **Sharded registry**: [`ConnectionRegistry`] keys handles by a random UUID v4
//!   [`ConnectionId`] in a `DashMap`. Fan-out iterates over a snapshot, so no send ever runs
//!   under a map lock.
//! - **Opaque payloads**: inbound payloads are parsed as JSON only to prove they are well formed
//!   and are re-serialized untouched into outbound envelopes.
//! - **Best effort**: no retries, no persistence, no cross-sender ordering. The worst outcome of
//!   any failure is one envelope not reaching one peer.
//!
//! # Message Flow
//!
//! 1. Upgrade completes; the transport calls [`BroadcastHub::on_connect`] and receives the id
//! 2. Hub sends `{"type":"connection","id":...}` to the new connection
//! 3. Client sends a payload; the transport calls [`BroadcastHub::on_message`]
//! 4. Hub sends `{"type":"message","data":...}` to the sender, then
//!    `{"type":"broadcast","from":...,"data":...}` to every other sendable connection
//! 5. Transport reports close or error; [`BroadcastHub::on_close`] / [`BroadcastHub::on_error`]
//!    remove the entry (idempotently)
//!
//! # Modules
//!
//! - `connection`: `ConnectionId`, the `ConnectionHandle` seam and the `ConnectionRegistry`
//! - `broadcast`: `BroadcastHub`, the relay protocol
//! - `message`: wire envelopes and payload decoding
//! - `error`: hub error kinds

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod message;

pub use broadcast::{BroadcastHub, DEFAULT_CONNECTED_MESSAGE};
pub use connection::{
    ChannelHandle, ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionState,
    SharedHandle,
};
pub use message::Envelope;
