//! Shared error type across chatwire crates.

use thiserror::Error;

/// Stable error codes (used in logs and asserted by tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input / malformed config.
    BadRequest,
    /// Incoming frame could not be decoded into an envelope.
    Decode,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Credential provider returned nothing or failed.
    Credential,
    /// Connection refused, handshake failure, abnormal close.
    Transport,
    /// Durable storage read/write failed.
    Storage,
    /// The client was torn down (or dropped) while the request was in flight.
    Disconnected,
    /// Internal invariant broken.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Decode => "DECODE",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Credential => "CREDENTIAL",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Storage => "STORAGE",
            ErrorCode::Disconnected => "DISCONNECTED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ChatwireError>;

/// Unified error type used by core and client.
#[derive(Debug, Clone, Error)]
pub enum ChatwireError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("credential unavailable: {0}")]
    Credential(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("disconnected")]
    Disconnected,
    #[error("internal: {0}")]
    Internal(String),
}

impl ChatwireError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChatwireError::BadRequest(_) => ErrorCode::BadRequest,
            ChatwireError::Decode(_) => ErrorCode::Decode,
            ChatwireError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            ChatwireError::Credential(_) => ErrorCode::Credential,
            ChatwireError::Transport(_) => ErrorCode::Transport,
            ChatwireError::Storage(_) => ErrorCode::Storage,
            ChatwireError::Disconnected => ErrorCode::Disconnected,
            ChatwireError::Internal(_) => ErrorCode::Internal,
        }
    }
}
