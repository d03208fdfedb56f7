//! PAIR signaling relay: registers peers by id over WebSocket and relays
//! offer, answer and forward envelopes between them.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for relay server operations.
pub mod error;
/// Outbound half of a client connection.
pub mod handle;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Peer id to connection table.
pub mod registry;
/// Envelope delivery to registered peers.
pub mod router;
/// Accept loop and shared server state.
pub mod server;
/// Per-connection protocol state.
pub mod session;

pub use server::{run, run_with_shutdown, ServerState};
