//! REST handlers. Every billable route debits before it touches the
//! collaborator, so a refused debit aborts the action.

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiResult};
