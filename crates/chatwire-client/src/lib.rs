//! chatwire client runtime.
//!
//! Keeps one real-time connection to the chat backend alive: connection
//! lifecycle, heartbeat, backoff reconnection, message dispatch, connection
//! state publishing and the pending/offline send queues. The binary
//! (`main.rs`) and the integration tests consume it through `ChatClient`.

pub mod backoff;
pub mod client;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod heartbeat;
pub mod queue;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

pub use client::{ChatClient, ChatClientBuilder, StateSubscription};
pub use session::{RoomId, WakeReason};
pub use state::ConnectionState;
