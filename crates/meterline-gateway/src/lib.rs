//! meterline gateway library entry.
//!
//! Wires the credit ledger, subscriber registry and metering service into an
//! axum server: REST handlers that bill per action and a WebSocket channel
//! that streams billing events. Consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod api;
pub mod app_state;
pub mod collab;
pub mod config;
pub mod live;
pub mod metering;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod router;
pub mod transport;
