//! Protocol modules.
//!
//! - `kind`: the message-type vocabulary shared with the chat server.
//! - `envelope`: the JSON envelope every frame carries.
//!
//! Decoding is panic-free: malformed input is reported as `ChatwireError`
//! instead of panicking.

pub mod envelope;
pub mod kind;

pub use envelope::Envelope;
pub use kind::MessageKind;
