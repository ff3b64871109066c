//! Frame mapping between tungstenite messages and transport frames.
//!
//! - Text frames pass through untouched (decoded into envelopes by the session)
//! - Close frames carry their code/reason
//! - Ping/Pong/Binary/raw frames are protocol noise for this client and skipped

use tokio_tungstenite::tungstenite::Message;

use crate::transport::{Inbound, Outbound};

/// Close code used when the socket ends without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;
/// Close code reported when the peer sent a close frame without a status.
pub const NO_STATUS: u16 = 1005;

pub fn decode(msg: Message) -> Option<Inbound> {
    match msg {
        Message::Text(s) => Some(Inbound::Text(s)),
        Message::Close(frame) => {
            let (code, reason) = frame
                .map(|cf| (cf.code.into(), cf.reason.to_string()))
                .unwrap_or((NO_STATUS, String::new()));
            Some(Inbound::Closed { code, reason })
        }
        Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

pub fn encode(out: Outbound) -> Message {
    match out {
        Outbound::Text(s) => Message::Text(s),
        Outbound::Close => Message::Close(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn close_frame_keeps_code_and_reason() {
        let msg = Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        }));
        assert_eq!(
            decode(msg),
            Some(Inbound::Closed {
                code: 1001,
                reason: "bye".into()
            })
        );
        assert_eq!(
            decode(Message::Close(None)),
            Some(Inbound::Closed {
                code: NO_STATUS,
                reason: String::new()
            })
        );
    }

    #[test]
    fn control_and_binary_frames_are_skipped() {
        assert_eq!(decode(Message::Ping(vec![1])), None);
        assert_eq!(decode(Message::Binary(vec![0, 1])), None);
        assert_eq!(decode(Message::Text("{}".into())), Some(Inbound::Text("{}".into())));
    }
}
