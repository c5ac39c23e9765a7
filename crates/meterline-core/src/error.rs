//! Shared error type across meterline crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Debit would take the balance below zero.
    InsufficientCredits,
    /// Billable kind is not in the cost schedule.
    UnknownEventKind,
    /// Metering core (or a collaborator) is not available.
    ServiceUnavailable,
    /// Delivery channel already closed.
    ChannelClosed,
    /// Invalid input / malformed message.
    BadRequest,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::InsufficientCredits => "INSUFFICIENT_CREDITS",
            ClientCode::UnknownEventKind => "UNKNOWN_EVENT_KIND",
            ClientCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ClientCode::ChannelClosed => "CHANNEL_CLOSED",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("insufficient credits for {user_id}: balance {balance}, cost {cost}")]
    InsufficientCredits {
        user_id: String,
        balance: i64,
        cost: i64,
    },
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl MeterError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MeterError::InsufficientCredits { .. } => ClientCode::InsufficientCredits,
            MeterError::UnknownEventKind(_) => ClientCode::UnknownEventKind,
            MeterError::ServiceUnavailable(_) => ClientCode::ServiceUnavailable,
            MeterError::ChannelClosed => ClientCode::ChannelClosed,
            MeterError::BadRequest(_) => ClientCode::BadRequest,
            MeterError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            MeterError::Internal(_) => ClientCode::Internal,
        }
    }
}
