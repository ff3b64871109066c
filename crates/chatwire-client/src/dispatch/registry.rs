use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;

use chatwire_core::{Envelope, MessageKind};

/// Callback invoked with the payload and the full envelope.
pub type Listener = Arc<dyn Fn(&Value, &Envelope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Message-kind keyed listener table.
#[derive(Default)]
pub struct DispatchRegistry {
    listeners: DashMap<MessageKind, Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("kinds", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for `kind`. The returned handle removes exactly this registration.
    pub fn on<F>(self: &Arc<Self>, kind: MessageKind, listener: F) -> Subscription
    where
        F: Fn(&Value, &Envelope) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(kind.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            registry: Arc::downgrade(self),
            kind,
            id,
        }
    }

    /// Remove one registration. Unknown ids are ignored.
    pub fn off(&self, kind: &MessageKind, id: ListenerId) -> bool {
        let mut removed = false;
        if let Some(mut list) = self.listeners.get_mut(kind) {
            let before = list.len();
            list.retain(|(lid, _)| *lid != id);
            removed = list.len() != before;
        }
        self.listeners.remove_if(kind, |_, list| list.is_empty());
        removed
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self, kind: &MessageKind) -> usize {
        self.listeners.get(kind).map_or(0, |l| l.len())
    }

    /// Deliver to every listener for the envelope's exact kind.
    ///
    /// Listeners run on a snapshot, so they may register/unregister freely.
    /// A panicking listener is logged and skipped. `pong` is never delivered.
    pub fn dispatch(&self, env: &Envelope) -> usize {
        if *env.kind() == MessageKind::Pong {
            return 0;
        }

        let snapshot: Vec<Listener> = match self.listeners.get(env.kind()) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            let res = catch_unwind(AssertUnwindSafe(|| listener(env.payload(), env)));
            match res {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(kind = %env.kind(), request_id = %env.request_id(), "listener panicked");
                }
            }
        }
        delivered
    }
}

/// Deregistration handle returned by `on`.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<DispatchRegistry>,
    kind: MessageKind,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Same as `off(kind, id)`.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.off(&self.kind, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Value, &Envelope) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, move |_: &Value, _: &Envelope| {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn delivers_to_exact_kind_only() {
        let reg = Arc::new(DispatchRegistry::new());
        let (a, fa) = counter();
        let (b, fb) = counter();
        reg.on(MessageKind::NewMessage, fa);
        reg.on(MessageKind::UserJoined, fb);

        let env = Envelope::new(MessageKind::NewMessage, json!({ "content": "x" }));
        assert_eq!(reg.dispatch(&env), 1);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let reg = Arc::new(DispatchRegistry::new());
        let (a, fa) = counter();
        let (b, fb) = counter();
        let sub_a = reg.on(MessageKind::NewMessage, fa);
        let sub_b = reg.on(MessageKind::NewMessage, fb);
        let id_b = sub_b.id();

        sub_a.unsubscribe();
        reg.dispatch(&Envelope::new(MessageKind::NewMessage, Value::Null));
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);

        assert!(reg.off(&MessageKind::NewMessage, id_b));
        assert!(!reg.off(&MessageKind::NewMessage, id_b));
        assert_eq!(reg.listener_count(&MessageKind::NewMessage), 0);
    }

    #[test]
    fn pong_is_never_delivered() {
        let reg = Arc::new(DispatchRegistry::new());
        let (a, fa) = counter();
        reg.on(MessageKind::Pong, fa);
        assert_eq!(reg.dispatch(&Envelope::new(MessageKind::Pong, Value::Null)), 0);
        assert_eq!(a.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let reg = Arc::new(DispatchRegistry::new());
        let (a, fa) = counter();
        reg.on(MessageKind::UserTyping, |_: &Value, _: &Envelope| panic!("boom"));
        reg.on(MessageKind::UserTyping, fa);

        let delivered = reg.dispatch(&Envelope::new(MessageKind::UserTyping, Value::Null));
        assert_eq!(delivered, 1);
        assert_eq!(a.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unsubscribe_during_dispatch() {
        let reg = Arc::new(DispatchRegistry::new());
        let slot: Arc<std::sync::Mutex<Option<Subscription>>> = Arc::default();
        let slot2 = Arc::clone(&slot);
        let sub = reg.on(MessageKind::RoomInvited, move |_: &Value, _: &Envelope| {
            if let Some(s) = slot2.lock().unwrap().take() {
                s.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        assert_eq!(reg.dispatch(&Envelope::new(MessageKind::RoomInvited, Value::Null)), 1);
        assert_eq!(reg.listener_count(&MessageKind::RoomInvited), 0);
    }

    #[test]
    fn unknown_kinds_route_by_tag() {
        let reg = Arc::new(DispatchRegistry::new());
        let (a, fa) = counter();
        reg.on(MessageKind::Other("room_archived".into()), fa);
        let env = Envelope::decode(r#"{"type":"room_archived","payload":{}}"#).unwrap();
        assert_eq!(reg.dispatch(&env), 1);
        assert_eq!(a.load(Ordering::SeqCst), 1);
    }
}
