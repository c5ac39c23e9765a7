use std::collections::BTreeMap;

use serde::Deserialize;
use meterline_core::error::{MeterError, Result};
use meterline_core::kinds;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeterConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub billing: BillingSection,

    #[serde(default)]
    pub channels: ChannelSection,
}

impl MeterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeterError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.billing.validate()?;
        self.channels.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(MeterError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(MeterError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(MeterError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:8000".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingSection {
    /// Balance given to an account on first reference.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: i64,

    /// Refuse debits that would take a balance below zero.
    #[serde(default = "default_enforce_floor")]
    pub enforce_floor: bool,

    /// Append-only JSONL journal; in-memory only when unset.
    #[serde(default)]
    pub journal_path: Option<String>,

    #[serde(default = "default_costs")]
    pub costs: BTreeMap<String, i64>,
}

impl Default for BillingSection {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            enforce_floor: default_enforce_floor(),
            journal_path: None,
            costs: default_costs(),
        }
    }
}

impl BillingSection {
    pub fn validate(&self) -> Result<()> {
        if self.starting_balance < 0 {
            return Err(MeterError::BadRequest(
                "billing.starting_balance must not be negative".into(),
            ));
        }
        if self.costs.is_empty() {
            return Err(MeterError::BadRequest("billing.costs must not be empty".into()));
        }
        for (kind, cost) in &self.costs {
            if kind.trim().is_empty() {
                return Err(MeterError::BadRequest("billing.costs has an empty kind".into()));
            }
            if *cost < 0 {
                return Err(MeterError::BadRequest(format!(
                    "billing.costs.{kind} must not be negative"
                )));
            }
        }
        Ok(())
    }
}

fn default_starting_balance() -> i64 {
    10
}
fn default_enforce_floor() -> bool {
    true
}
fn default_costs() -> BTreeMap<String, i64> {
    [
        (kinds::QUESTION, 1),
        (kinds::REPORT, 3),
        (kinds::FILE_UPLOAD, 1),
        (kinds::RESEARCH_FILE_UPLOAD, 1),
        (kinds::LIVE_DATA, 1),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    /// Per-subscriber delivery queue bound; the oldest event is dropped on overflow.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ChannelSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=65536).contains(&self.queue_capacity) {
            return Err(MeterError::BadRequest(
                "channels.queue_capacity must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_queue_capacity() -> usize {
    64
}
