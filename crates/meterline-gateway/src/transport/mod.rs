//! Transport layer (WebSocket notification channel).

pub mod codec;
pub mod ws;

pub use ws::{run_channel, ChannelExit, ChannelState, ChannelTimers};
