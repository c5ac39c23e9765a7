//! In-process metrics for the metering core.
//!
//! Stored as atomics, rendered in Prometheus text format by `/metrics`.

pub mod metrics;

pub use metrics::MeterMetrics;
