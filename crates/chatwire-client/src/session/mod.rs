//! Session actor: the one task that owns the connection.
//!
//! Everything mutable about the transport lives here: the open link, the
//! outstanding connection attempt, backoff, heartbeat timers, both send
//! queues, the active room and the state machine. `ChatClient` handles talk
//! to it through `Command`s, so there is never concurrent mutation.
//!
//! State machine:
//! `disconnected -> connecting -> connected`, abnormal close
//! `connected -> reconnecting -> connecting -> connected` (looping with
//! backoff), and any state `-> disconnected` on intentional teardown.

mod command;

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;

use chatwire_core::error::{ChatwireError, Result};
use chatwire_core::{Envelope, MessageKind};

use crate::backoff::Backoff;
use crate::config::{ClientConfig, EndpointSection};
use crate::credentials::CredentialProvider;
use crate::dispatch::DispatchRegistry;
use crate::heartbeat::{Heartbeat, HeartbeatEvent};
use crate::queue::{Drain, OfflineQueue, PendingQueue, QueueStats};
use crate::state::{ConnectionState, StateCell, StatePublisher};
use crate::store::KeyValueStore;
use crate::transport::{Connector, Inbound, TransportLink};

pub(crate) use command::Command;
pub use command::{RoomId, WakeReason};

/// Read-side state mirrored for handles.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: Arc<StateCell>,
    pub(crate) offline_len: Arc<AtomicUsize>,
    pub(crate) active_room: Mutex<Option<RoomId>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(StateCell::new(ConnectionState::Disconnected)),
            offline_len: Arc::new(AtomicUsize::new(0)),
            active_room: Mutex::new(None),
        }
    }
}

/// Injected collaborators.
pub(crate) struct Deps {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) store: Arc<dyn KeyValueStore>,
}

enum AttemptOutcome {
    Opened { credential: String, link: TransportLink },
    Failed(ChatwireError),
}

type Attempt = Pin<Box<dyn Future<Output = AttemptOutcome> + Send>>;

enum CredentialSource {
    /// Supplied by the caller of `connect`.
    Given(String),
    /// Asked from the provider; `fallback` is used only if that fails.
    Fresh { fallback: Option<String> },
}

pub(crate) struct Session {
    endpoint: EndpointSection,
    connect_timeout: Duration,
    room_key: String,

    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn KeyValueStore>,
    shared: Arc<Shared>,
    registry: Arc<DispatchRegistry>,
    publisher: StatePublisher,

    link: Option<TransportLink>,
    link_credential: Option<String>,
    last_credential: Option<String>,
    attempt: Option<Attempt>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
    retry: Option<Pin<Box<Sleep>>>,
    backoff: Backoff,
    heartbeat: Heartbeat,

    pending: PendingQueue,
    offline: OfflineQueue,
    active_room: Option<RoomId>,

    /// Set by `disconnect`; suppresses every automatic attempt.
    intentional: bool,
    /// Set on entering `reconnecting`; the next open rejoins the active room.
    rejoin_on_open: bool,
}

impl Session {
    pub(crate) fn new(
        cfg: &ClientConfig,
        deps: Deps,
        shared: Arc<Shared>,
        registry: Arc<DispatchRegistry>,
    ) -> Self {
        let offline = OfflineQueue::load(
            Arc::clone(&deps.store),
            cfg.storage.offline_queue_key.clone(),
            Arc::clone(&shared.offline_len),
        );
        let active_room = load_room(deps.store.as_ref(), &cfg.storage.active_room_key);
        if let Ok(mut slot) = shared.active_room.lock() {
            *slot = active_room;
        }

        Self {
            endpoint: cfg.endpoint.clone(),
            connect_timeout: cfg.reconnect.connect_timeout(),
            room_key: cfg.storage.active_room_key.clone(),
            connector: deps.connector,
            credentials: deps.credentials,
            store: deps.store,
            publisher: StatePublisher::new(Arc::clone(&shared.state)),
            shared,
            registry,
            link: None,
            link_credential: None,
            last_credential: None,
            attempt: None,
            waiters: Vec::new(),
            retry: None,
            backoff: Backoff::new(cfg.reconnect.base_delay(), cfg.reconnect.max_delay()),
            heartbeat: Heartbeat::new(cfg.heartbeat.interval(), cfg.heartbeat.timeout()),
            pending: PendingQueue::new(),
            offline,
            active_room,
            intentional: false,
            rejoin_on_open: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        self.shutdown();
                        break;
                    }
                },

                outcome = poll_attempt(&mut self.attempt) => {
                    self.attempt = None;
                    self.on_attempt_done(outcome);
                }

                inbound = recv_link(&mut self.link) => self.on_inbound(inbound),

                event = self.heartbeat.next() => self.on_heartbeat(event),

                () = wait_retry(&mut self.retry) => {
                    self.retry = None;
                    self.on_retry_due();
                }
            }
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { credential, reply } => self.connect(credential, reply),
            Command::Reconnect { reply } => self.reconnect(reply),
            Command::Disconnect { reply } => {
                self.teardown();
                let _ = reply.send(());
            }
            Command::Send(env) => self.route(env),
            Command::JoinRoom(room) => {
                self.remember_room(Some(room));
                self.route(Envelope::new(MessageKind::JoinRoom, json!({ "room_id": room })));
            }
            Command::LeaveRoom(room) => {
                if self.active_room == Some(room) {
                    self.remember_room(None);
                }
                self.route(Envelope::new(MessageKind::LeaveRoom, json!({ "room_id": room })));
            }
            Command::Wake(reason) => self.wake(reason),
            Command::SubscribeState { id, listener } => self.publisher.subscribe(id, listener),
            Command::UnsubscribeState { id } => self.publisher.unsubscribe(id),
            Command::Stats { reply } => {
                let _ = reply.send(QueueStats {
                    pending: self.pending.len(),
                    offline: self.offline.len(),
                });
            }
        }
    }

    // --------------------
    // lifecycle
    // --------------------

    fn connect(&mut self, credential: String, reply: oneshot::Sender<Result<()>>) {
        self.intentional = false;

        if self.attempt.is_some() {
            tracing::debug!("connect while an attempt is in flight; joining it");
            self.waiters.push(reply);
            return;
        }

        if self.link.is_some() {
            if self.link_credential.as_deref() == Some(credential.as_str()) {
                let _ = reply.send(Ok(()));
                return;
            }
            tracing::info!("credential changed; replacing open transport");
            self.drop_link();
        }

        self.cancel_retry();
        self.waiters.push(reply);
        self.start_attempt(CredentialSource::Given(credential));
    }

    fn reconnect(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.attempt.is_some() || self.link.is_some() {
            tracing::debug!(state = %self.publisher.current(), "manual reconnect ignored");
            let _ = reply.send(Ok(()));
            return;
        }

        tracing::info!("manual reconnect");
        self.intentional = false;
        self.backoff.reset();
        self.cancel_retry();
        self.waiters.push(reply);
        self.start_attempt(CredentialSource::Fresh {
            fallback: self.last_credential.clone(),
        });
    }

    fn wake(&mut self, reason: WakeReason) {
        let idle_offline = self.publisher.current() == ConnectionState::Reconnecting
            && self.attempt.is_none()
            && self.link.is_none();
        if self.intentional || !idle_offline {
            tracing::debug!(reason = reason.as_str(), state = %self.publisher.current(), "wake ignored");
            return;
        }

        tracing::info!(reason = reason.as_str(), "wake; reconnecting now");
        self.cancel_retry();
        self.start_attempt(CredentialSource::Fresh { fallback: None });
    }

    fn start_attempt(&mut self, source: CredentialSource) {
        self.offline.reattach();

        let connector = Arc::clone(&self.connector);
        let provider = Arc::clone(&self.credentials);
        let endpoint = self.endpoint.clone();
        let connect_timeout = self.connect_timeout;
        let attempt_no = self.backoff.attempt();

        self.attempt = Some(Box::pin(async move {
            let credential = match source {
                CredentialSource::Given(c) => c,
                CredentialSource::Fresh { fallback } => match acquire(provider.as_ref()).await {
                    Ok(c) => c,
                    Err(e) => match fallback {
                        Some(c) => {
                            tracing::warn!(error = %e, "credential refresh failed; using last known credential");
                            c
                        }
                        None => return AttemptOutcome::Failed(e),
                    },
                },
            };

            let url = match endpoint.url_for(&credential) {
                Ok(url) => url,
                Err(e) => return AttemptOutcome::Failed(e),
            };
            let shown = &url[..url::Position::AfterPath];
            tracing::info!(endpoint = shown, attempt = attempt_no, "connecting");

            match tokio::time::timeout(connect_timeout, connector.connect(&url)).await {
                Ok(Ok(link)) => AttemptOutcome::Opened { credential, link },
                Ok(Err(e)) => AttemptOutcome::Failed(e),
                Err(_) => AttemptOutcome::Failed(ChatwireError::Transport("connect timed out".into())),
            }
        }));

        self.set_state(ConnectionState::Connecting);
    }

    fn on_attempt_done(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Opened { credential, link } => self.on_open(link, credential),
            AttemptOutcome::Failed(e) => {
                tracing::warn!(error = %e, code = e.code().as_str(), "connection attempt failed");
                self.resolve_waiters(Err(e));
                self.spill_pending();
                if self.intentional {
                    self.set_state(ConnectionState::Disconnected);
                } else {
                    self.schedule_retry();
                }
            }
        }
    }

    fn on_open(&mut self, link: TransportLink, credential: String) {
        tracing::info!(failures = self.backoff.attempt(), "connected");
        self.backoff.reset();
        self.link = Some(link);
        self.link_credential = Some(credential.clone());
        self.last_credential = Some(credential);
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start();
        self.resolve_waiters(Ok(()));

        if !self.flush_queues() {
            return;
        }

        if std::mem::take(&mut self.rejoin_on_open) {
            if let Some(room) = self.active_room {
                tracing::info!(room, "rejoining room after reconnect");
                self.route(Envelope::new(MessageKind::JoinRoom, json!({ "room_id": room })));
            }
        }
    }

    /// Pending first, then offline. Returns false if the transport died mid-way.
    fn flush_queues(&mut self) -> bool {
        let Some(link) = self.link.as_ref() else {
            return false;
        };

        let res = self
            .pending
            .drain_into(|env| transmit(link, env))
            .and_then(|p| self.offline.drain_into(|env| transmit(link, env)).map(|o| (p, o)));

        match res {
            Ok((pending, offline)) => {
                if pending + offline > 0 {
                    tracing::info!(pending, offline, "queues flushed");
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "flush interrupted; transport lost");
                // resume in flush order: pending ahead of offline
                let rest = self.pending.take_all();
                if !rest.is_empty() {
                    self.offline.prepend(rest);
                }
                self.on_transport_lost();
                false
            }
        }
    }

    fn on_transport_lost(&mut self) {
        self.drop_link();
        if self.intentional {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let delay = self.backoff.next_delay();
        self.rejoin_on_open = true;
        self.set_state(ConnectionState::Reconnecting);
        tracing::info!(
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        self.retry = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn on_retry_due(&mut self) {
        self.start_attempt(CredentialSource::Fresh { fallback: None });
    }

    /// Intentional teardown (`disconnect`).
    fn teardown(&mut self) {
        tracing::info!(state = %self.publisher.current(), "disconnect requested");
        self.intentional = true;
        self.rejoin_on_open = false;
        self.heartbeat.stop();
        self.cancel_retry();
        if self.attempt.take().is_some() {
            tracing::debug!("in-flight connection attempt abandoned");
        }
        self.resolve_waiters(Err(ChatwireError::Disconnected));
        self.drop_link();
        self.registry.clear();
        self.remember_room(None);
        self.spill_pending();
        self.offline.detach();
        self.backoff.reset();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Every handle is gone. Release resources but keep persisted state.
    fn shutdown(&mut self) {
        tracing::debug!("all client handles dropped; session stopping");
        self.heartbeat.stop();
        self.cancel_retry();
        self.attempt = None;
        self.resolve_waiters(Err(ChatwireError::Disconnected));
        self.spill_pending();
        self.drop_link();
    }

    fn drop_link(&mut self) {
        self.heartbeat.stop();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.link_credential = None;
    }

    fn cancel_retry(&mut self) {
        self.retry = None;
    }

    fn resolve_waiters(&mut self, res: Result<()>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(res.clone());
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        self.publisher.transition(next);
    }

    // --------------------
    // outgoing
    // --------------------

    fn route(&mut self, env: Envelope) {
        match self.link.as_ref().map(|link| transmit(link, &env)) {
            Some(Ok(())) => {
                tracing::trace!(kind = %env.kind(), request_id = %env.request_id(), "sent");
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, kind = %env.kind(), "transmit failed; queued offline");
                self.offline.push(env);
                self.on_transport_lost();
            }
            None if self.attempt.is_some() => {
                tracing::debug!(kind = %env.kind(), "queued (pending)");
                self.pending.push(env);
            }
            None => {
                tracing::debug!(kind = %env.kind(), "queued (offline)");
                self.offline.push(env);
            }
        }
    }

    /// Move pending sends to the back of the durable queue so a failed
    /// attempt or a teardown cannot lose them. Pending items are only ever
    /// queued during an attempt, after everything already offline.
    fn spill_pending(&mut self) {
        let items = self.pending.take_all();
        if !items.is_empty() {
            tracing::info!(count = items.len(), "pending sends moved to offline queue");
            self.offline.extend(items);
        }
    }

    fn remember_room(&mut self, room: Option<RoomId>) {
        self.active_room = room;
        if let Ok(mut slot) = self.shared.active_room.lock() {
            *slot = room;
        }
        let res = match room {
            Some(r) => self.store.set(&self.room_key, &r.to_string()),
            None => self.store.remove(&self.room_key),
        };
        if let Err(e) = res {
            tracing::warn!(error = %e, "active room persist failed");
        }
    }

    // --------------------
    // incoming
    // --------------------

    fn on_inbound(&mut self, inbound: Option<Inbound>) {
        match inbound {
            Some(Inbound::Text(text)) => self.on_frame(&text),
            Some(Inbound::Closed { code, reason }) => {
                tracing::info!(code, reason = %reason, "transport closed");
                self.on_transport_lost();
            }
            None => {
                tracing::info!("transport stream ended");
                self.on_transport_lost();
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        let env = match Envelope::decode(text) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "discarding malformed envelope");
                return;
            }
        };

        if *env.kind() == MessageKind::Pong {
            self.heartbeat.on_pong();
            tracing::trace!("pong");
            return;
        }

        let delivered = self.registry.dispatch(&env);
        tracing::trace!(kind = %env.kind(), delivered, "dispatched");
    }

    fn on_heartbeat(&mut self, event: HeartbeatEvent) {
        match event {
            HeartbeatEvent::Ping => {
                let ping = Envelope::new(MessageKind::Ping, json!({}));
                match self.link.as_ref().map(|link| transmit(link, &ping)) {
                    Some(Ok(())) => self.heartbeat.arm_watchdog(),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "ping failed");
                        self.on_transport_lost();
                    }
                    None => self.heartbeat.stop(),
                }
            }
            HeartbeatEvent::Timeout => {
                tracing::warn!("no pong within watchdog window; forcing reconnect");
                self.on_transport_lost();
            }
        }
    }
}

fn transmit(link: &TransportLink, env: &Envelope) -> Result<()> {
    link.transmit(env.encode()?)
}

async fn acquire(provider: &dyn CredentialProvider) -> Result<String> {
    match provider.credential().await? {
        Some(c) => Ok(c),
        None => Err(ChatwireError::Credential("provider returned no credential".into())),
    }
}

fn load_room(store: &dyn KeyValueStore, key: &str) -> Option<RoomId> {
    match store.get(key) {
        Ok(Some(raw)) => match raw.trim().parse() {
            Ok(room) => Some(room),
            Err(e) => {
                tracing::warn!(error = %e, "stored active room unreadable");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "active room read failed");
            None
        }
    }
}

async fn poll_attempt(attempt: &mut Option<Attempt>) -> AttemptOutcome {
    match attempt {
        Some(fut) => fut.as_mut().await,
        None => pending().await,
    }
}

async fn recv_link(link: &mut Option<TransportLink>) -> Option<Inbound> {
    match link {
        Some(link) => link.recv().await,
        None => pending().await,
    }
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
