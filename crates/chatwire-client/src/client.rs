//! Public client handle.
//!
//! `ChatClient` is cheap to clone; every clone talks to the same session
//! actor. The actor stops (without logging out) once the last handle is
//! dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use chatwire_core::error::{ChatwireError, Result};
use chatwire_core::{Envelope, MessageKind};

use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::dispatch::{DispatchRegistry, ListenerId, Subscription};
use crate::queue::QueueStats;
use crate::session::{Command, Deps, RoomId, Session, Shared, WakeReason};
use crate::state::ConnectionState;
use crate::store::{FileStore, KeyValueStore};
use crate::transport::{Connector, WsConnector};

#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    registry: Arc<DispatchRegistry>,
    next_state_id: AtomicU64,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Wires collaborators into a running session.
pub struct ChatClientBuilder {
    cfg: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
    connector: Option<Arc<dyn Connector>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl ChatClientBuilder {
    /// Defaults to `WsConnector`.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Defaults to a `FileStore` rooted at `storage.dir`.
    pub fn store(mut self, store: impl KeyValueStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate config, rehydrate persisted state and spawn the session.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn build(self) -> Result<ChatClient> {
        self.cfg.validate()?;

        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(s) => s,
            None => Arc::new(FileStore::new(&self.cfg.storage.dir)?),
        };
        let connector: Arc<dyn Connector> = match self.connector {
            Some(c) => c,
            None => Arc::new(WsConnector::new()),
        };

        let shared = Arc::new(Shared::new());
        let registry = Arc::new(DispatchRegistry::new());
        let session = Session::new(
            &self.cfg,
            Deps {
                connector,
                credentials: self.credentials,
                store,
            },
            Arc::clone(&shared),
            Arc::clone(&registry),
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(session.run(rx).instrument(tracing::info_span!("chat_session")));

        Ok(ChatClient {
            inner: Arc::new(ClientInner {
                commands: tx,
                shared,
                registry,
                next_state_id: AtomicU64::new(1),
            }),
        })
    }
}

impl ChatClient {
    /// `credentials` is consulted before every automatic reconnection attempt.
    pub fn builder(
        cfg: ClientConfig,
        credentials: impl CredentialProvider,
    ) -> ChatClientBuilder {
        ChatClientBuilder {
            cfg,
            credentials: Arc::new(credentials),
            connector: None,
            store: None,
        }
    }

    // --------------------
    // lifecycle
    // --------------------

    /// Open the transport with `credential`.
    ///
    /// Resolves once the transport is open (queues flushed), or with the
    /// error of the attempt. A failed attempt still leaves the session
    /// retrying in the background.
    pub async fn connect(&self, credential: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect {
            credential: credential.into(),
            reply,
        })?;
        rx.await.map_err(|_| ChatwireError::Disconnected)?
    }

    /// Manual reconnect with a freshly acquired credential. Ignored while
    /// connecting or connected.
    pub async fn reconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Reconnect { reply })?;
        rx.await.map_err(|_| ChatwireError::Disconnected)?
    }

    /// Intentional teardown (logout).
    ///
    /// Stops every timer, closes the transport, clears dispatch listeners and
    /// the active room. Unsent messages stay in durable storage and go out on
    /// the next successful connection.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Host signal: the page/app is visible again.
    pub fn notify_visible(&self) {
        let _ = self.command(Command::Wake(WakeReason::Visible));
    }

    /// Host signal: network connectivity came back.
    pub fn notify_online(&self) {
        let _ = self.command(Command::Wake(WakeReason::Online));
    }

    // --------------------
    // outgoing
    // --------------------

    /// Transmit now if connected, otherwise queue (pending while an attempt
    /// is in flight, durable offline queue otherwise).
    pub fn send(&self, kind: impl Into<MessageKind>, payload: Value) -> Result<()> {
        self.command(Command::Send(Envelope::new(kind.into(), payload)))
    }

    /// Join `room` and remember it as the active room (rejoined after reconnect).
    pub fn join_room(&self, room: RoomId) -> Result<()> {
        self.command(Command::JoinRoom(room))
    }

    pub fn leave_room(&self, room: RoomId) -> Result<()> {
        self.command(Command::LeaveRoom(room))
    }

    pub fn send_message(&self, room: RoomId, content: &str, message_type: &str) -> Result<()> {
        self.send(
            MessageKind::SendMessage,
            json!({ "room_id": room, "content": content, "message_type": message_type }),
        )
    }

    pub fn set_typing(&self, room: RoomId, is_typing: bool) -> Result<()> {
        self.send(
            MessageKind::Typing,
            json!({ "room_id": room, "is_typing": is_typing }),
        )
    }

    pub fn mark_read(&self, room: RoomId, message_id: u64) -> Result<()> {
        self.send(
            MessageKind::MarkRead,
            json!({ "room_id": room, "message_id": message_id }),
        )
    }

    // --------------------
    // incoming
    // --------------------

    /// Register a listener for one message kind.
    pub fn on<F>(&self, kind: impl Into<MessageKind>, listener: F) -> Subscription
    where
        F: Fn(&Value, &Envelope) + Send + Sync + 'static,
    {
        self.inner.registry.on(kind.into(), listener)
    }

    pub fn off(&self, kind: &MessageKind, id: ListenerId) -> bool {
        self.inner.registry.off(kind, id)
    }

    /// Observe connection state. The current state is delivered first, then
    /// every transition exactly once, in order.
    pub fn on_connection_state_change<F>(&self, listener: F) -> StateSubscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.inner.next_state_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.command(Command::SubscribeState {
            id,
            listener: Arc::new(listener),
        });
        StateSubscription {
            commands: self.inner.commands.downgrade(),
            id,
        }
    }

    // --------------------
    // observation
    // --------------------

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of envelopes waiting in the durable offline queue.
    pub fn offline_len(&self) -> usize {
        self.inner.shared.offline_len.load(Ordering::Acquire)
    }

    pub fn active_room(&self) -> Option<RoomId> {
        match self.inner.shared.active_room.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Pending and offline counts, as seen by the session.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Stats { reply })?;
        rx.await.map_err(|_| ChatwireError::Disconnected)
    }

    fn command(&self, cmd: Command) -> Result<()> {
        self.inner
            .commands
            .send(cmd)
            .map_err(|_| ChatwireError::Disconnected)
    }
}

/// Handle returned by `on_connection_state_change`.
#[derive(Debug)]
pub struct StateSubscription {
    commands: mpsc::WeakUnboundedSender<Command>,
    id: u64,
}

impl StateSubscription {
    pub fn unsubscribe(self) {
        if let Some(tx) = self.commands.upgrade() {
            let _ = tx.send(Command::UnsubscribeState { id: self.id });
        }
    }
}
