//! Common types and utilities shared across the PAIR signaling stack.
//!
//! This crate provides:
//! - JSON envelope decoding and encoding ([`envelope`])
//! - Peer identifiers and protocol constants ([`types`])
//!
//! Nothing in here performs I/O, so the codec can be exercised directly
//! from tests and benchmarks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod types;

pub use envelope::{DecodeError, Envelope, SdpKind};
pub use types::PeerId;
