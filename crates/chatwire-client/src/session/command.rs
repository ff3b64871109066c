use tokio::sync::oneshot;

use chatwire_core::error::Result;
use chatwire_core::Envelope;

use crate::queue::QueueStats;
use crate::state::StateListener;

pub type RoomId = u64;

/// Why the host thinks now is a good moment to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The hosting page/app became visible again.
    Visible,
    /// The OS reported network connectivity is back.
    Online,
}

impl WakeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            WakeReason::Visible => "visible",
            WakeReason::Online => "online",
        }
    }
}

/// Requests from `ChatClient` handles to the session actor.
pub(crate) enum Command {
    Connect {
        credential: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Reconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send(Envelope),
    JoinRoom(RoomId),
    LeaveRoom(RoomId),
    Wake(WakeReason),
    SubscribeState {
        id: u64,
        listener: StateListener,
    },
    UnsubscribeState {
        id: u64,
    },
    Stats {
        reply: oneshot::Sender<QueueStats>,
    },
}
