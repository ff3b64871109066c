//! chatwire core: wire envelope, message-kind vocabulary, and the error type.
//!
//! This crate defines the wire-level contract shared by the client runtime
//! and any tooling that reads persisted queues. It carries no transport or
//! runtime dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! Malformed frames surface as `ChatwireError::Decode` so a bad server frame
//! never takes the client down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ChatwireError, ErrorCode, Result};
pub use protocol::{Envelope, MessageKind};
