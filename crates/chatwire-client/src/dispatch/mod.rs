//! Dispatch registry module exports.
//!
//! Incoming envelopes are routed by `MessageKind` to registered listeners.

pub mod registry;

pub use registry::{DispatchRegistry, Listener, ListenerId, Subscription};
