//! In-process connector.
//!
//! Every successful `connect` produces a `MemoryPeer`, the server side of the
//! link, which the test receives through `MemoryConnector::accept`.
//! Connections can be refused or held open-pending to drive the session
//! through its failure and `connecting` paths deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Semaphore};
use url::Url;

use chatwire_core::error::{ChatwireError, Result};
use chatwire_core::Envelope;

use crate::transport::{Connector, Inbound, Outbound, TransportLink};

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    inner: Arc<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    attempts: AtomicUsize,
    refuse: AtomicUsize,
    /// `Some` when connects must wait for `release`.
    gate: Option<Semaphore>,
    peer_tx: mpsc::UnboundedSender<MemoryPeer>,
    peer_rx: Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
    urls: std::sync::Mutex<Vec<Url>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    /// Connects complete immediately.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Connects stay outstanding until `release` hands out a permit.
    pub fn gated() -> Self {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MemoryInner {
                attempts: AtomicUsize::new(0),
                refuse: AtomicUsize::new(0),
                gate,
                peer_tx,
                peer_rx: Mutex::new(peer_rx),
                urls: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.inner.refuse.store(n, Ordering::SeqCst);
    }

    /// Let `n` gated connection attempts proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(n);
        }
    }

    /// Number of connection attempts seen so far (refused ones included).
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// URLs of every attempt, in order.
    pub fn urls(&self) -> Vec<Url> {
        self.inner
            .urls
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&self) -> Option<MemoryPeer> {
        self.inner.peer_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<TransportLink> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.inner.urls.lock() {
            urls.push(url.clone());
        }

        if let Some(gate) = &self.inner.gate {
            gate.acquire()
                .await
                .map_err(|_| ChatwireError::Transport("gate closed".into()))?
                .forget();
        }

        let refused = self
            .inner
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChatwireError::Transport("connection refused".into()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.clone(),
            from_client: out_rx,
            to_client: in_tx,
            seen: VecDeque::new(),
        };
        self.inner
            .peer_tx
            .send(peer)
            .map_err(|_| ChatwireError::Transport("memory listener gone".into()))?;

        Ok(TransportLink::new(out_tx, in_rx))
    }
}

/// Server side of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    pub url: Url,
    from_client: mpsc::UnboundedReceiver<Outbound>,
    to_client: mpsc::UnboundedSender<Inbound>,
    seen: VecDeque<Outbound>,
}

impl MemoryPeer {
    /// Push a raw text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) -> Result<()> {
        self.to_client
            .send(Inbound::Text(text.into()))
            .map_err(|_| ChatwireError::Transport("client link gone".into()))
    }

    pub fn push(&self, env: &Envelope) -> Result<()> {
        self.push_text(env.encode()?)
    }

    /// Close from the server side with a status code.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Inbound::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Everything the client has written so far, without waiting.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out: Vec<Outbound> = self.seen.drain(..).collect();
        while let Ok(frame) = self.from_client.try_recv() {
            out.push(frame);
        }
        out
    }

    /// Envelopes the client has written so far (close frames skipped).
    pub fn drain_envelopes(&mut self) -> Vec<Envelope> {
        self.drain()
            .into_iter()
            .filter_map(|f| match f {
                Outbound::Text(t) => Envelope::decode(&t).ok(),
                Outbound::Close => None,
            })
            .collect()
    }

    /// Wait for the next frame from the client.
    pub async fn next_frame(&mut self) -> Option<Outbound> {
        if let Some(f) = self.seen.pop_front() {
            return Some(f);
        }
        self.from_client.recv().await
    }

    /// True once the client dropped its side of the link.
    pub fn is_client_gone(&mut self) -> bool {
        loop {
            match self.from_client.try_recv() {
                Ok(frame) => self.seen.push_back(frame),
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }
}
