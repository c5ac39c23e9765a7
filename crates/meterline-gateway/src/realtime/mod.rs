//! Realtime fan-out of billing events.
//!
//! `SubscriberRegistry` owns one bounded `DeliveryQueue` per live channel and
//! pushes every published `UsageEvent` to all of a user's queues.

pub mod queue;
pub mod registry;

pub use queue::{DeliveryQueue, PushOutcome};
pub use registry::{SubscriberRegistry, Subscription, SubscriptionGuard};
