//! Transport layer (socket wrapper).
//!
//! A `Connector` opens one full-duplex connection and hands back a
//! `TransportLink`: a pair of channels to a pump task that owns the raw
//! socket. The session actor only ever sees text frames and a close signal;
//! envelopes are decoded once, in the actor, before dispatch.
//!
//! - `ws`: tokio-tungstenite connector used in production.
//! - `memory`: in-process connector for tests (`test-util` feature).
//! - `codec`: tungstenite message <-> transport frame mapping.

pub mod codec;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use chatwire_core::error::{ChatwireError, Result};

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryPeer};
pub use ws::WsConnector;

/// Frame handed from the pump to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Closed { code: u16, reason: String },
}

/// Frame handed from the session to the pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Open connection as seen by the session actor.
///
/// Existence of a link means the transport is open; the pump ends the
/// inbound stream (or sends `Closed`) when the socket goes away.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Fire-and-forget transmit. Fails only if the pump is gone.
    pub fn transmit(&self, text: String) -> Result<()> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| ChatwireError::Transport("socket pump closed".into()))
    }

    /// Ask the pump to close the socket. Best-effort.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }
}

/// Opens connections to the chat endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<TransportLink>;
}
