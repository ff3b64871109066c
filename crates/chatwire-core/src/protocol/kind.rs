//! Message-type vocabulary (`type` field of every envelope).
//!
//! Known tags map to dedicated variants so the client can key its dispatch
//! table by enum. Unknown tags are kept verbatim in `Other` and still routed
//! by exact tag.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    // client -> server
    SendMessage,
    JoinRoom,
    LeaveRoom,
    Typing,
    MarkRead,
    Ping,

    // server -> client
    Pong,
    NewMessage,
    MessageRead,
    UserTyping,
    UserJoined,
    UserLeft,
    PresenceUpdate,
    RoomInvited,
    RoomJoined,
    RoomLeft,
    AuthRequired,
    Error,

    /// Any tag this build does not know about.
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::SendMessage => "send_message",
            MessageKind::JoinRoom => "join_room",
            MessageKind::LeaveRoom => "leave_room",
            MessageKind::Typing => "typing",
            MessageKind::MarkRead => "mark_read",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::NewMessage => "new_message",
            MessageKind::MessageRead => "message_read",
            MessageKind::UserTyping => "user_typing",
            MessageKind::UserJoined => "user_joined",
            MessageKind::UserLeft => "user_left",
            MessageKind::PresenceUpdate => "presence_update",
            MessageKind::RoomInvited => "room_invited",
            MessageKind::RoomJoined => "room_joined",
            MessageKind::RoomLeft => "room_left",
            MessageKind::AuthRequired => "auth_required",
            MessageKind::Error => "error",
            MessageKind::Other(tag) => tag,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        match tag {
            "send_message" => MessageKind::SendMessage,
            "join_room" => MessageKind::JoinRoom,
            "leave_room" => MessageKind::LeaveRoom,
            "typing" => MessageKind::Typing,
            "mark_read" => MessageKind::MarkRead,
            "ping" => MessageKind::Ping,
            "pong" => MessageKind::Pong,
            "new_message" => MessageKind::NewMessage,
            "message_read" => MessageKind::MessageRead,
            "user_typing" => MessageKind::UserTyping,
            "user_joined" => MessageKind::UserJoined,
            "user_left" => MessageKind::UserLeft,
            "presence_update" => MessageKind::PresenceUpdate,
            "room_invited" => MessageKind::RoomInvited,
            "room_joined" => MessageKind::RoomJoined,
            "room_left" => MessageKind::RoomLeft,
            "auth_required" => MessageKind::AuthRequired,
            "error" => MessageKind::Error,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        MessageKind::from(tag.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
