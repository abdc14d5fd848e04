//! WebSocket HTTP handler for the web layer.
//!
//! This module contains only the Axum upgrade handler and the per-connection read/write
//! loops. The relay itself (BroadcastHub, ConnectionRegistry, envelopes) lives in the `hub`
//! crate so it stays independent of any transport.

pub mod handler;
