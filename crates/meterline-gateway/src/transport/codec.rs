//! Frame codec for the notification channel.
//!
//! - Outbound: `Notification` => WS text frame (encode once per frame)
//! - Inbound: clients only send control frames; data frames are surfaced so
//!   the channel can count them as liveness and otherwise ignore them.

use axum::extract::ws::{close_code, CloseFrame, Message};
use meterline_core::{error::Result, protocol::Notification};

#[derive(Debug)]
pub enum Inbound {
    Ping(Vec<u8>),
    Pong,
    Close,
    Data { bytes_len: usize },
}

pub fn encode(note: &Notification) -> Result<Message> {
    Ok(Message::Text(note.encode()?))
}

pub fn decode(msg: Message) -> Inbound {
    match msg {
        Message::Ping(v) => Inbound::Ping(v),
        Message::Pong(_) => Inbound::Pong,
        Message::Close(_) => Inbound::Close,
        Message::Text(s) => Inbound::Data { bytes_len: s.len() },
        Message::Binary(b) => Inbound::Data { bytes_len: b.len() },
    }
}

/// Close frame sent after a terminal `error` notification.
pub fn close_with_error(reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::ERROR,
        reason: reason.into(),
    }))
}

/// Normal close frame.
pub fn close_normal() -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: "".into(),
    }))
}
