//! Server -> client notification frames.

use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};
use crate::model::{UsageEvent, UsageStats};

/// One text frame on the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    /// Current aggregate usage, sent once right after subscribing.
    Snapshot { usage_stats: UsageStats },
    /// A debit applied after the subscription was registered.
    /// Event fields are flattened next to the `type` discriminator.
    Event(UsageEvent),
    /// Terminal error. The channel closes after sending it.
    Error { message: String },
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Notification::Error {
            message: message.into(),
        }
    }

    /// Serialize to the JSON text carried by a WS text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| MeterError::Internal(format!("notification encode failed: {e}")))
    }

    /// Parse a frame produced by [`Notification::encode`] (client side).
    pub fn decode(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| MeterError::BadRequest(format!("invalid notification json: {e}")))
    }
}
