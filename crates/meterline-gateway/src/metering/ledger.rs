use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use meterline_core::error::{MeterError, Result};
use meterline_core::{CreditAccount, UsageEvent, UsageStats};

use super::cost::CostSchedule;
use super::journal::{JournalRecord, UsageJournal};

/// How debits treat the zero floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancePolicy {
    /// Refuse a debit that would leave the balance negative.
    EnforceFloor,
    /// Record every debit; balances may go negative.
    Advisory,
}

struct AccountState {
    account: CreditAccount,
    history: Vec<UsageEvent>,
    /// `account` record already in the journal.
    persisted: bool,
}

/// Per-user balances and usage history.
///
/// Each account sits behind its own async mutex; the map itself is sharded.
/// Debits for one user are applied in lock-acquisition order (tokio's mutex is
/// FIFO), debits for different users never contend on the same lock.
pub struct CreditLedger {
    accounts: DashMap<String, Arc<Mutex<AccountState>>>,
    schedule: Arc<CostSchedule>,
    starting_balance: i64,
    policy: BalancePolicy,
    journal: Option<UsageJournal>,
}

impl CreditLedger {
    pub fn new(schedule: Arc<CostSchedule>, starting_balance: i64, policy: BalancePolicy) -> Self {
        Self {
            accounts: DashMap::new(),
            schedule,
            starting_balance,
            policy,
            journal: None,
        }
    }

    /// Rebuild state from `journal`'s file, then keep appending to it.
    pub async fn with_journal(
        schedule: Arc<CostSchedule>,
        starting_balance: i64,
        policy: BalancePolicy,
        journal: UsageJournal,
    ) -> Result<Self> {
        let records = UsageJournal::replay(journal.path()).await?;
        let mut ledger = Self::new(schedule, starting_balance, policy);
        let (accounts, events) = ledger.restore(records);
        tracing::info!(path=%journal.path().display(), accounts, events, "ledger restored from journal");
        ledger.journal = Some(journal);
        Ok(ledger)
    }

    fn restore(&self, records: Vec<JournalRecord>) -> (usize, usize) {
        let mut states: HashMap<String, AccountState> = HashMap::new();
        let mut events = 0;
        for rec in records {
            match rec {
                JournalRecord::Account(account) => {
                    states
                        .entry(account.user_id.clone())
                        .or_insert_with(|| AccountState {
                            account,
                            history: Vec::new(),
                            persisted: true,
                        });
                }
                JournalRecord::Usage(ev) => {
                    let st = states.entry(ev.user_id.clone()).or_insert_with(|| {
                        let mut account = CreditAccount::open(ev.user_id.clone(), self.starting_balance);
                        account.created_at = ev.timestamp;
                        AccountState {
                            account,
                            history: Vec::new(),
                            persisted: true,
                        }
                    });
                    st.account.balance -= ev.credits_used;
                    st.account.last_activity = ev.timestamp;
                    st.history.push(ev);
                    events += 1;
                }
            }
        }

        let accounts = states.len();
        for (user, st) in states {
            self.accounts.insert(user, Arc::new(Mutex::new(st)));
        }
        (accounts, events)
    }

    pub fn schedule(&self) -> &CostSchedule {
        &self.schedule
    }

    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<AccountState>> {
        if let Some(s) = self.accounts.get(user_id) {
            return Arc::clone(s.value());
        }
        let starting = self.starting_balance;
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(AccountState {
                    account: CreditAccount::open(user_id, starting),
                    history: Vec::new(),
                    persisted: false,
                }))
            })
            .clone()
    }

    async fn persist_account(&self, st: &mut AccountState) -> Result<()> {
        if st.persisted {
            return Ok(());
        }
        if let Some(j) = &self.journal {
            j.append(&JournalRecord::Account(st.account.clone())).await?;
            tracing::debug!(user=%st.account.user_id, balance=st.account.balance, "account opened");
        }
        st.persisted = true;
        Ok(())
    }

    /// Existing account, or a freshly opened one at the starting balance.
    pub async fn account(&self, user_id: &str) -> Result<CreditAccount> {
        let slot = self.slot(user_id);
        let mut st = slot.lock().await;
        self.persist_account(&mut st).await?;
        Ok(st.account.clone())
    }

    pub async fn debit(&self, user_id: &str, kind: &str, description: &str) -> Result<UsageEvent> {
        self.debit_and_then(user_id, kind, description, |_| {}).await
    }

    /// Debit, then run `committed` on the new event while the user's account
    /// lock is still held. Used to publish in debit order.
    /// `committed` must not block.
    pub async fn debit_and_then<F>(
        &self,
        user_id: &str,
        kind: &str,
        description: &str,
        committed: F,
    ) -> Result<UsageEvent>
    where
        F: FnOnce(&UsageEvent),
    {
        let cost = self.schedule.cost(kind)?;

        let slot = self.slot(user_id);
        let mut st = slot.lock().await;
        self.persist_account(&mut st).await?;

        let balance = st.account.balance;
        let next = balance
            .checked_sub(cost)
            .ok_or_else(|| MeterError::Internal(format!("balance overflow for {user_id}")))?;
        if self.policy == BalancePolicy::EnforceFloor && next < 0 {
            return Err(MeterError::InsufficientCredits {
                user_id: user_id.to_string(),
                balance,
                cost,
            });
        }

        let event = UsageEvent::new(user_id, kind, cost, description);
        if let Some(j) = &self.journal {
            j.append(&JournalRecord::Usage(event.clone())).await?;
        }

        st.account.balance = next;
        st.account.last_activity = event.timestamp;
        st.history.push(event.clone());

        committed(&event);
        Ok(event)
    }

    /// Reflects every debit that completed before this call acquired the lock.
    pub async fn usage_stats(&self, user_id: &str) -> Result<UsageStats> {
        let slot = self.slot(user_id);
        let mut st = slot.lock().await;
        self.persist_account(&mut st).await?;
        Ok(UsageStats::derive(&st.account, &st.history))
    }

    /// Audit trail in insertion order.
    pub async fn history(&self, user_id: &str) -> Result<Vec<UsageEvent>> {
        let slot = self.slot(user_id);
        let mut st = slot.lock().await;
        self.persist_account(&mut st).await?;
        Ok(st.history.clone())
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(balance: i64, policy: BalancePolicy) -> CreditLedger {
        CreditLedger::new(Arc::new(CostSchedule::default()), balance, policy)
    }

    #[tokio::test]
    async fn account_is_opened_lazily() {
        let l = ledger(10, BalancePolicy::EnforceFloor);
        assert_eq!(l.account_count(), 0);
        let a = l.account("u1").await.unwrap();
        assert_eq!(a.balance, 10);
        assert_eq!(l.account_count(), 1);
    }

    #[tokio::test]
    async fn unknown_kind_touches_nothing() {
        let l = ledger(10, BalancePolicy::EnforceFloor);
        let err = l.debit("u1", "premium", "x").await.unwrap_err();
        assert!(matches!(err, MeterError::UnknownEventKind(_)));
        assert_eq!(l.account_count(), 0);
    }

    #[tokio::test]
    async fn floor_refuses_without_mutation() {
        let l = ledger(2, BalancePolicy::EnforceFloor);
        let err = l.debit("u1", "report", "r").await.unwrap_err();
        assert!(matches!(
            err,
            MeterError::InsufficientCredits { balance: 2, cost: 3, .. }
        ));
        assert_eq!(l.account("u1").await.unwrap().balance, 2);
        assert!(l.history("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn advisory_policy_goes_negative() {
        let l = ledger(2, BalancePolicy::Advisory);
        assert_eq!(l.policy(), BalancePolicy::Advisory);
        l.debit("u1", "report", "r").await.unwrap();
        let stats = l.usage_stats("u1").await.unwrap();
        assert_eq!(stats.credits_remaining, -1);
        assert_eq!(stats.credits_used, 3);
        assert_eq!(stats.total_reports, 1);
    }

    #[tokio::test]
    async fn committed_hook_runs_only_on_success() {
        let l = ledger(1, BalancePolicy::EnforceFloor);
        let mut seen = Vec::new();
        l.debit_and_then("u1", "question", "q", |ev| seen.push(ev.id.clone()))
            .await
            .unwrap();
        let _ = l
            .debit_and_then("u1", "question", "q", |ev| seen.push(ev.id.clone()))
            .await;
        assert_eq!(seen.len(), 1);
    }
}
