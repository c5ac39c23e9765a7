//! meterline core: billing data model, wire protocol, and error types.
//!
//! This crate defines the records the ledger produces, the messages the
//! notification channel puts on the wire, and the error surface shared by the
//! gateway and its handlers. It carries no transport or runtime dependencies
//! so it can be reused by clients and tooling.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `MeterError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod model;
pub mod protocol;

/// Shared result type.
pub use error::{MeterError, Result};
pub use model::{kinds, CreditAccount, LiveDataItem, UsageEvent, UsageStats};
