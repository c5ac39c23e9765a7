//! Wire protocol for the billing notification channel.
//!
//! Every frame is a JSON object discriminated by `type`:
//! `snapshot` (once, at connect), `event` (one per applied debit), and
//! `error` (best effort, right before the channel closes).
//!
//! Decoding is panic-free: malformed input is reported as `MeterError`.

pub mod notify;

pub use notify::Notification;
