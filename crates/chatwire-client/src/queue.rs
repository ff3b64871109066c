//! Outgoing send queues.
//!
//! - `PendingQueue`: memory-only, filled while a connection attempt is in flight.
//! - `OfflineQueue`: persisted under a fixed key on every mutation, filled while
//!   no attempt is outstanding and no transport is open; rehydrated on load.
//!
//! Both are strict FIFO. Items leave a queue only after the transmit call to an
//! open transport succeeded (see `drain_into`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chatwire_core::error::Result;
use chatwire_core::Envelope;

use crate::store::KeyValueStore;

/// Pending + offline counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub offline: usize,
}

/// Send every queued envelope through `transmit`, oldest first.
///
/// Stops at the first failure, leaving that item and everything after it
/// queued. Returns the number of envelopes handed to the transport.
pub trait Drain {
    fn front(&self) -> Option<&Envelope>;
    fn pop_front(&mut self) -> Option<Envelope>;

    fn drain_into<F>(&mut self, mut transmit: F) -> Result<usize>
    where
        F: FnMut(&Envelope) -> Result<()>,
    {
        let mut sent = 0;
        while let Some(env) = self.front() {
            transmit(env)?;
            self.pop_front();
            sent += 1;
        }
        Ok(sent)
    }
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<Envelope>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, env: Envelope) {
        self.items.push_back(env);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Hand every item over (oldest first) and leave the queue empty.
    pub fn take_all(&mut self) -> Vec<Envelope> {
        self.items.drain(..).collect()
    }
}

impl Drain for PendingQueue {
    fn front(&self) -> Option<&Envelope> {
        self.items.front()
    }

    fn pop_front(&mut self) -> Option<Envelope> {
        self.items.pop_front()
    }
}

pub struct OfflineQueue {
    items: VecDeque<Envelope>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    /// In-memory view dropped by `detach`; storage still holds the items.
    detached: bool,
    len_gauge: Arc<AtomicUsize>,
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("key", &self.key)
            .field("len", &self.items.len())
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

impl OfflineQueue {
    /// Rehydrate from storage. Unreadable content is logged and treated as empty.
    pub fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>, len_gauge: Arc<AtomicUsize>) -> Self {
        let key = key.into();
        let items = read_items(store.as_ref(), &key);
        if !items.is_empty() {
            tracing::info!(key = %key, count = items.len(), "offline queue rehydrated");
        }
        let queue = Self {
            items,
            store,
            key,
            detached: false,
            len_gauge,
        };
        queue.publish_len();
        queue
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Envelope> {
        self.items.iter().cloned().collect()
    }

    pub fn push(&mut self, env: Envelope) {
        self.reattach();
        self.items.push_back(env);
        self.persist();
    }

    pub fn extend(&mut self, envs: Vec<Envelope>) {
        if envs.is_empty() {
            return;
        }
        self.reattach();
        self.items.extend(envs);
        self.persist();
    }

    /// Put `envs` ahead of everything already queued, keeping their order.
    pub fn prepend(&mut self, envs: Vec<Envelope>) {
        if envs.is_empty() {
            return;
        }
        self.reattach();
        for env in envs.into_iter().rev() {
            self.items.push_front(env);
        }
        self.persist();
    }

    /// Drop the in-memory view; storage keeps its content for a later session.
    pub fn detach(&mut self) {
        self.items.clear();
        self.detached = true;
        self.publish_len();
    }

    /// Reload from storage after a `detach`. No-op otherwise.
    pub fn reattach(&mut self) {
        if !self.detached {
            return;
        }
        self.items = read_items(self.store.as_ref(), &self.key);
        self.detached = false;
        self.publish_len();
    }

    fn persist(&self) {
        self.publish_len();
        let res = serde_json::to_string(&self.items)
            .map_err(|e| chatwire_core::ChatwireError::Internal(format!("queue encode failed: {e}")))
            .and_then(|json| self.store.set(&self.key, &json));
        if let Err(e) = res {
            tracing::error!(key = %self.key, error = %e, "offline queue persist failed; kept in memory");
        }
    }

    fn publish_len(&self) {
        self.len_gauge.store(self.items.len(), Ordering::Relaxed);
    }
}

impl Drain for OfflineQueue {
    fn front(&self) -> Option<&Envelope> {
        self.items.front()
    }

    fn pop_front(&mut self) -> Option<Envelope> {
        let env = self.items.pop_front();
        if env.is_some() {
            self.persist();
        }
        env
    }
}

fn read_items(store: &dyn KeyValueStore, key: &str) -> VecDeque<Envelope> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return VecDeque::new(),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "offline queue read failed");
            return VecDeque::new();
        }
    };
    match serde_json::from_str::<VecDeque<Envelope>>(&raw) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "offline queue content unreadable; starting empty");
            VecDeque::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chatwire_core::{ChatwireError, MessageKind};
    use serde_json::json;

    const KEY: &str = "chatwire.offline_queue";

    fn msg(n: u32) -> Envelope {
        Envelope::new(MessageKind::SendMessage, json!({ "room_id": 1, "content": format!("m{n}") }))
    }

    fn offline(store: &Arc<MemoryStore>) -> (OfflineQueue, Arc<AtomicUsize>) {
        let gauge = Arc::new(AtomicUsize::new(0));
        let store: Arc<dyn KeyValueStore> = store.clone();
        (OfflineQueue::load(store, KEY, Arc::clone(&gauge)), gauge)
    }

    #[test]
    fn rehydrated_queue_matches_persisted_content() {
        let store = Arc::new(MemoryStore::new());
        let (mut q, gauge) = offline(&store);
        let sent: Vec<Envelope> = (0..3).map(msg).collect();
        for e in &sent {
            q.push(e.clone());
        }
        assert_eq!(gauge.load(Ordering::Relaxed), 3);

        let (again, _) = offline(&store);
        assert_eq!(again.snapshot(), sent);
    }

    #[test]
    fn drain_stops_at_first_failure() {
        let store = Arc::new(MemoryStore::new());
        let (mut q, gauge) = offline(&store);
        for n in 0..4 {
            q.push(msg(n));
        }

        let mut seen = Vec::new();
        let res = q.drain_into(|e| {
            if seen.len() == 2 {
                return Err(ChatwireError::Transport("gone".into()));
            }
            seen.push(e.payload()["content"].as_str().unwrap_or_default().to_string());
            Ok(())
        });

        assert!(res.is_err());
        assert_eq!(seen, vec!["m0", "m1"]);
        assert_eq!(q.len(), 2);
        assert_eq!(gauge.load(Ordering::Relaxed), 2);

        let (again, _) = offline(&store);
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn detach_keeps_storage_and_reattach_restores() {
        let store = Arc::new(MemoryStore::new());
        let (mut q, gauge) = offline(&store);
        q.push(msg(0));
        q.detach();
        assert!(q.is_empty());
        assert_eq!(gauge.load(Ordering::Relaxed), 0);
        assert!(store.get(KEY).unwrap().is_some());

        q.push(msg(1));
        let contents: Vec<String> = q
            .snapshot()
            .iter()
            .map(|e| e.payload()["content"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(contents, vec!["m0", "m1"]);
    }

    #[test]
    fn prepend_goes_ahead_of_queued_items() {
        let store = Arc::new(MemoryStore::new());
        let (mut q, gauge) = offline(&store);
        q.push(msg(2));
        q.prepend(vec![msg(0), msg(1)]);
        assert_eq!(gauge.load(Ordering::Relaxed), 3);

        let (again, _) = offline(&store);
        let contents: Vec<String> = again
            .snapshot()
            .iter()
            .map(|e| e.payload()["content"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn garbage_in_storage_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, "{not json").unwrap();
        let (q, _) = offline(&store);
        assert!(q.is_empty());
    }

    #[test]
    fn pending_drains_in_order() {
        let mut p = PendingQueue::new();
        p.push(msg(0));
        p.push(msg(1));
        let mut order = Vec::new();
        let n = p
            .drain_into(|e| {
                order.push(e.request_id().to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 2);
        assert!(p.is_empty());
        assert_eq!(order.len(), 2);
    }
}
