//! Wire envelope (JSON text frame).
//!
//! Every frame in either direction is one envelope:
//! `{"type": "...", "payload": {...}, "timestamp": "...", "request_id": "..."}`.
//! Envelopes are immutable once built; fields are read through accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ChatwireError, Result};
use crate::protocol::kind::MessageKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: MessageKind,
    /// Opaque payload; servers may omit it (decodes as `null`).
    #[serde(default)]
    payload: Value,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    /// Client-generated id for idempotency/tracing. Server frames usually omit it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    request_id: String,
}

impl Envelope {
    /// Build an outgoing envelope with a fresh request id and the current time.
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ChatwireError::Decode(format!("invalid envelope json: {e}")))
    }

    /// Encode for transmission.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ChatwireError::Internal(format!("envelope encode failed: {e}")))
    }
}
