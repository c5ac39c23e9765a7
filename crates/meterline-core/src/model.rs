//! Billing records shared by the ledger, the notification channel and the
//! HTTP handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known billable kinds. The cost schedule may define more.
pub mod kinds {
    pub const QUESTION: &str = "question";
    pub const REPORT: &str = "report";
    pub const FILE_UPLOAD: &str = "file_upload";
    pub const RESEARCH_FILE_UPLOAD: &str = "research_file_upload";
    pub const LIVE_DATA: &str = "live_data";
}

/// Per-user credit balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: String,
    /// Signed so advisory metering (no floor) can run below zero.
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl CreditAccount {
    pub fn open(user_id: impl Into<String>, balance: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            balance,
            created_at: now,
            last_activity: now,
        }
    }
}

/// One applied debit. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub credits_used: i64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl UsageEvent {
    pub fn new(
        user_id: impl Into<String>,
        kind: impl Into<String>,
        credits_used: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind: kind.into(),
            credits_used,
            timestamp: Utc::now(),
            description: description.into(),
        }
    }
}

/// Aggregate usage view, derived on demand from an account and its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub user_id: String,
    pub total_questions: u64,
    pub total_reports: u64,
    pub credits_remaining: i64,
    pub credits_used: i64,
    pub last_activity: DateTime<Utc>,
}

impl UsageStats {
    pub fn derive(account: &CreditAccount, history: &[UsageEvent]) -> Self {
        let mut total_questions = 0;
        let mut total_reports = 0;
        let mut credits_used = 0;
        for ev in history {
            match ev.kind.as_str() {
                kinds::QUESTION => total_questions += 1,
                kinds::REPORT => total_reports += 1,
                _ => {}
            }
            credits_used += ev.credits_used;
        }
        Self {
            user_id: account.user_id.clone(),
            total_questions,
            total_reports,
            credits_remaining: account.balance,
            credits_used,
            last_activity: account.last_activity,
        }
    }
}

/// Item produced by the live feed after id/timestamp assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDataItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub category: String,
}
