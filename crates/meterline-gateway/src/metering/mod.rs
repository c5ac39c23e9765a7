//! Usage metering: cost schedule, credit ledger, journal, and the service
//! facade that composes them with the subscriber registry.

pub mod cost;
pub mod journal;
pub mod ledger;
pub mod service;

pub use cost::CostSchedule;
pub use journal::{JournalRecord, UsageJournal};
pub use ledger::{BalancePolicy, CreditLedger};
pub use service::UsageMeteringService;
