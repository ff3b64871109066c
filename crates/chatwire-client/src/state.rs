//! Connection state machine values and the state publisher.
//!
//! The publisher is owned by the session actor, so subscription, initial
//! delivery and every transition happen on one task, in order.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free mirror of the current state, readable from any handle.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

pub type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

pub struct StatePublisher {
    current: ConnectionState,
    cell: Arc<StateCell>,
    listeners: Vec<(u64, StateListener)>,
}

impl fmt::Debug for StatePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatePublisher")
            .field("current", &self.current)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl StatePublisher {
    pub fn new(cell: Arc<StateCell>) -> Self {
        let current = cell.get();
        Self {
            current,
            cell,
            listeners: Vec::new(),
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Register and immediately deliver the current state.
    pub fn subscribe(&mut self, id: u64, listener: StateListener) {
        notify(&listener, self.current);
        self.listeners.push((id, listener));
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Move to `next`. Re-entering the current state notifies nobody.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if next == self.current {
            return false;
        }
        tracing::debug!(from = %self.current, to = %next, "connection state");
        self.current = next;
        self.cell.set(next);
        for (_, listener) in &self.listeners {
            notify(listener, next);
        }
        true
    }
}

fn notify(listener: &StateListener, state: ConnectionState) {
    if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
        tracing::error!(state = %state, "state listener panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<ConnectionState>>>, StateListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (seen, Arc::new(move |st| s.lock().unwrap().push(st)))
    }

    #[test]
    fn initial_then_each_transition_once() {
        let cell = Arc::new(StateCell::new(ConnectionState::Disconnected));
        let mut p = StatePublisher::new(Arc::clone(&cell));
        let (seen, l) = recorder();
        p.subscribe(1, l);

        assert!(p.transition(ConnectionState::Connecting));
        assert!(!p.transition(ConnectionState::Connecting));
        assert!(p.transition(ConnectionState::Connected));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected
            ]
        );
        assert_eq!(cell.get(), ConnectionState::Connected);
    }

    #[test]
    fn late_subscriber_sees_current_only() {
        let cell = Arc::new(StateCell::new(ConnectionState::Disconnected));
        let mut p = StatePublisher::new(cell);
        p.transition(ConnectionState::Reconnecting);
        let (seen, l) = recorder();
        p.subscribe(7, l);
        p.unsubscribe(7);
        p.transition(ConnectionState::Connecting);
        assert_eq!(*seen.lock().unwrap(), vec![ConnectionState::Reconnecting]);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let cell = Arc::new(StateCell::new(ConnectionState::Disconnected));
        let mut p = StatePublisher::new(cell);
        p.subscribe(1, Arc::new(|st| {
            if st == ConnectionState::Connected {
                panic!("listener bug");
            }
        }));
        let (seen, l) = recorder();
        p.subscribe(2, l);
        p.transition(ConnectionState::Connected);
        assert_eq!(seen.lock().unwrap().last(), Some(&ConnectionState::Connected));
    }
}
