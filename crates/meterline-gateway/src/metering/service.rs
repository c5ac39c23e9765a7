use std::sync::Arc;
use std::time::Instant;

use meterline_core::error::Result;
use meterline_core::{UsageEvent, UsageStats};

use crate::config::{BillingSection, ChannelSection};
use crate::obs::MeterMetrics;
use crate::realtime::{SubscriberRegistry, Subscription};

use super::cost::CostSchedule;
use super::journal::UsageJournal;
use super::ledger::{BalancePolicy, CreditLedger};

/// The only metering entry point handlers and channels talk to.
pub struct UsageMeteringService {
    ledger: CreditLedger,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<MeterMetrics>,
}

impl UsageMeteringService {
    pub fn new(ledger: CreditLedger, registry: Arc<SubscriberRegistry>, metrics: Arc<MeterMetrics>) -> Self {
        Self {
            ledger,
            registry,
            metrics,
        }
    }

    /// Build from config, replaying the journal when one is configured.
    pub async fn from_config(
        billing: &BillingSection,
        channels: &ChannelSection,
        metrics: Arc<MeterMetrics>,
    ) -> Result<Self> {
        let schedule = Arc::new(CostSchedule::from_config(billing));
        let policy = if billing.enforce_floor {
            BalancePolicy::EnforceFloor
        } else {
            BalancePolicy::Advisory
        };

        let ledger = match &billing.journal_path {
            Some(path) => {
                let journal = UsageJournal::open(path).await?;
                CreditLedger::with_journal(schedule, billing.starting_balance, policy, journal).await?
            }
            None => CreditLedger::new(schedule, billing.starting_balance, policy),
        };

        let registry = Arc::new(SubscriberRegistry::new(channels.queue_capacity));
        Ok(Self::new(ledger, registry, metrics))
    }

    /// Debit `kind` for `user_id` and fan the event out to live channels.
    ///
    /// Publishing happens inside the user's ledger critical section so events
    /// reach subscribers in debit order. On failure nothing is published.
    pub async fn track_usage(&self, user_id: &str, kind: &str, description: &str) -> Result<UsageEvent> {
        let started = Instant::now();
        let registry = &self.registry;

        let res = self
            .ledger
            .debit_and_then(user_id, kind, description, |ev| {
                registry.publish(user_id, ev);
            })
            .await;

        match &res {
            Ok(ev) => {
                self.metrics.debits.inc(&[("kind", kind)]);
                self.metrics.credits.add(&[("kind", kind)], ev.credits_used.max(0) as u64);
                self.metrics.debit_duration.observe(&[("kind", kind)], started.elapsed());
                tracing::info!(user=%user_id, kind=%kind, credits=ev.credits_used, event=%ev.id, "usage tracked");
            }
            Err(e) => {
                self.metrics.debit_rejections.inc(&[("code", e.client_code().as_str())]);
                tracing::warn!(user=%user_id, kind=%kind, error=%e, "usage rejected");
            }
        }
        res
    }

    pub fn credit_cost(&self, kind: &str) -> Result<i64> {
        self.ledger.schedule().cost(kind)
    }

    pub fn schedule(&self) -> &CostSchedule {
        self.ledger.schedule()
    }

    pub async fn usage_stats(&self, user_id: &str) -> Result<UsageStats> {
        self.ledger.usage_stats(user_id).await
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<UsageEvent>> {
        self.ledger.history(user_id).await
    }

    pub fn subscribe(&self, user_id: &str) -> Subscription {
        self.registry.subscribe(user_id)
    }

    pub fn unsubscribe(&self, user_id: &str, subscription_id: u64) {
        self.registry.unsubscribe(user_id, subscription_id)
    }

    pub fn registry(&self) -> Arc<SubscriberRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Close all live channels; used on shutdown.
    pub fn shutdown(&self) {
        self.registry.close_all();
    }
}
