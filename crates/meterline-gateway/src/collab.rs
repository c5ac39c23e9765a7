//! Outbound collaborator interface (document retrieval + language model).
//!
//! The gateway only bills and routes; answering questions, building reports
//! and indexing documents happen behind [`ResearchAgent`]. `OfflineAgent` is
//! the development stand-in used when no real backend is wired.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use meterline_core::error::Result;
use meterline_core::LiveDataItem;

/// Plain-text document handed to the collaborator. Parsing binary formats is
/// the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub content: String,
}

#[async_trait]
pub trait ResearchAgent: Send + Sync {
    async fn chat(&self, session_id: &str, user_id: &str, message: &str) -> Result<Value>;

    /// Turns of one chat session, oldest first. Unknown sessions are empty.
    async fn conversation_history(&self, session_id: &str) -> Result<Vec<Value>>;

    async fn generate_report(&self, user_id: &str, query: &str) -> Result<Value>;

    /// Returns `false` when the collaborator accepted the call but indexed nothing.
    async fn add_documents(&self, docs: Vec<Document>, source_type: &str) -> Result<bool>;

    async fn add_live_data(&self, items: &[LiveDataItem]) -> Result<()>;

    fn stats(&self) -> Value;
}

/// Echo-style agent with no external dependencies.
#[derive(Default)]
pub struct OfflineAgent {
    sessions: DashMap<String, Vec<Value>>,
    chats: AtomicU64,
    reports: AtomicU64,
    documents: AtomicU64,
    live_items: AtomicU64,
}

impl OfflineAgent {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResearchAgent for OfflineAgent {
    async fn chat(&self, session_id: &str, user_id: &str, message: &str) -> Result<Value> {
        self.chats.fetch_add(1, Ordering::Relaxed);
        let answer = format!("(offline) received: {message}");
        self.sessions.entry(session_id.to_string()).or_default().extend([
            json!({ "role": "user", "content": message, "timestamp": Utc::now() }),
            json!({ "role": "assistant", "content": answer, "timestamp": Utc::now() }),
        ]);
        Ok(json!({
            "mode": "offline",
            "session_id": session_id,
            "user_id": user_id,
            "answer": answer,
            "sources": [],
        }))
    }

    async fn conversation_history(&self, session_id: &str) -> Result<Vec<Value>> {
        Ok(self.sessions.get(session_id).map(|h| h.clone()).unwrap_or_default())
    }

    async fn generate_report(&self, user_id: &str, query: &str) -> Result<Value> {
        let n = self.reports.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(json!({
            "id": format!("report_{n}"),
            "question": query,
            "summary": format!("(offline) no sources indexed for: {query}"),
            "key_takeaways": [],
            "citations": [],
            "sources_used": [],
            "generated_at": Utc::now(),
            "user_id": user_id,
        }))
    }

    async fn add_documents(&self, docs: Vec<Document>, source_type: &str) -> Result<bool> {
        let n = docs.iter().filter(|d| !d.content.is_empty()).count() as u64;
        self.documents.fetch_add(n, Ordering::Relaxed);
        tracing::debug!(docs = n, source_type, "offline agent indexed documents");
        Ok(n > 0)
    }

    async fn add_live_data(&self, items: &[LiveDataItem]) -> Result<()> {
        self.live_items.fetch_add(items.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn stats(&self) -> Value {
        json!({
            "mode": "offline",
            "chats": self.chats.load(Ordering::Relaxed),
            "sessions": self.sessions.len(),
            "reports": self.reports.load(Ordering::Relaxed),
            "documents": self.documents.load(Ordering::Relaxed),
            "live_items": self.live_items.load(Ordering::Relaxed),
        })
    }
}
