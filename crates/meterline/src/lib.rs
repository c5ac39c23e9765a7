//! Top-level facade crate for meterline.
//!
//! Re-exports the billing model and the gateway library so embedders can
//! depend on a single crate.

pub mod core {
    pub use meterline_core::*;
}

pub mod gateway {
    pub use meterline_gateway::*;
}
