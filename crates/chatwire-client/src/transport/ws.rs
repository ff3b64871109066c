//! WebSocket connector (tokio-tungstenite).
//!
//! Responsibilities:
//! - Handshake against the endpoint URL (TLS via rustls for `wss`)
//! - Split the socket and spawn a pump that owns both halves
//! - Surface text frames and a single close signal to the session
//!
//! The pump exits on the first error in either direction; dropping its
//! inbound sender is what the session observes as closure.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use url::Url;

use chatwire_core::error::{ChatwireError, Result};

use crate::transport::codec::{self, ABNORMAL_CLOSE};
use crate::transport::{Connector, Inbound, Outbound, TransportLink};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<TransportLink> {
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ChatwireError::Transport(format!("websocket handshake failed: {e}")))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(socket, out_rx, in_tx));

        Ok(TransportLink::new(out_tx, in_rx))
    }
}

async fn pump(
    socket: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    in_tx: mpsc::UnboundedSender<Inbound>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = ws_tx.send(codec::encode(Outbound::Text(text))).await {
                            tracing::debug!(error = %e, "websocket write failed");
                            let _ = in_tx.send(Inbound::Closed { code: ABNORMAL_CLOSE, reason: e.to_string() });
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(codec::encode(Outbound::Close)).await;
                        let _ = ws_tx.close().await;
                        break;
                    }
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(msg)) => {
                        let Some(frame) = codec::decode(msg) else { continue; };
                        let closed = matches!(frame, Inbound::Closed { .. });
                        if in_tx.send(frame).is_err() || closed {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = in_tx.send(Inbound::Closed { code: ABNORMAL_CLOSE, reason: e.to_string() });
                        break;
                    }
                    None => {
                        let _ = in_tx.send(Inbound::Closed { code: ABNORMAL_CLOSE, reason: "stream ended".into() });
                        break;
                    }
                }
            }
        }
    }
}
