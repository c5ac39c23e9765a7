//! Live-data ingestion.
//!
//! A feed hands over `(title, summary, link, source, category)`. Ingestion is
//! billable: the `live_data` debit happens first, then the item gets its id
//! and timestamp and is forwarded to the collaborator. Ids follow ingestion
//! order (`live_1`, `live_2`, ...). Duplicates are accepted as new items.
//!
//! The most recent items are kept so a refresh can hand the current feed to
//! the collaborator again (billed) or re-seed research (unbilled).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Deserialize;

use meterline_core::error::{MeterError, Result};
use meterline_core::{kinds, LiveDataItem, UsageEvent};

use crate::collab::ResearchAgent;
use crate::metering::UsageMeteringService;
use crate::obs::MeterMetrics;

pub const DEFAULT_SOURCE: &str = "Mock Live Source";
pub const DEFAULT_CATEGORY: &str = "Updates";
pub const INGEST_DESCRIPTION: &str = "Incremental live item ingested";
pub const REFRESH_DESCRIPTION: &str = "Live data refresh";
/// Items retained for refreshes, newest last.
pub const RECENT_CAPACITY: usize = 50;

/// Raw feed tuple.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

pub struct LiveIngestor {
    seq: AtomicU64,
    recent: Mutex<VecDeque<LiveDataItem>>,
    agent: Option<Arc<dyn ResearchAgent>>,
    metrics: Arc<MeterMetrics>,
}

impl LiveIngestor {
    pub fn new(agent: Option<Arc<dyn ResearchAgent>>, metrics: Arc<MeterMetrics>) -> Self {
        Self {
            seq: AtomicU64::new(1),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
            agent,
            metrics,
        }
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    /// Retained items, oldest first.
    pub fn recent(&self) -> Vec<LiveDataItem> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn remember(&self, item: &LiveDataItem) {
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() >= RECENT_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(item.clone());
    }

    /// Assign id and timestamp.
    pub fn assign(&self, entry: FeedEntry) -> LiveDataItem {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        LiveDataItem {
            id: format!("live_{n}"),
            title: entry.title,
            link: entry.link.unwrap_or_default(),
            summary: entry.summary,
            timestamp: Utc::now(),
            source: entry.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            category: entry.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        }
    }

    pub async fn ingest(
        &self,
        metering: &UsageMeteringService,
        user_id: &str,
        entry: FeedEntry,
    ) -> Result<(LiveDataItem, UsageEvent)> {
        let event = metering
            .track_usage(user_id, kinds::LIVE_DATA, INGEST_DESCRIPTION)
            .await?;

        let item = self.assign(entry);
        self.remember(&item);
        self.metrics.live_items.inc(&[("source", &item.source)]);

        match &self.agent {
            Some(agent) => agent.add_live_data(std::slice::from_ref(&item)).await?,
            None => tracing::debug!(item=%item.id, "no research agent, live item not forwarded"),
        }

        tracing::info!(user=%user_id, item=%item.id, source=%item.source, "live item ingested");
        Ok((item, event))
    }

    /// Billed refresh: debit `live_data`, then forward the retained items.
    pub async fn refresh(
        &self,
        metering: &UsageMeteringService,
        user_id: &str,
    ) -> Result<(Vec<LiveDataItem>, UsageEvent)> {
        let event = metering
            .track_usage(user_id, kinds::LIVE_DATA, REFRESH_DESCRIPTION)
            .await?;

        let items = self.recent();
        if let (Some(agent), false) = (&self.agent, items.is_empty()) {
            agent.add_live_data(&items).await?;
        }
        tracing::info!(user=%user_id, items = items.len(), "live data refreshed");
        Ok((items, event))
    }

    /// Unbilled push of the retained items into the research collaborator.
    pub async fn push_to_agent(&self) -> Result<usize> {
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| MeterError::ServiceUnavailable("Research agent not available".into()))?;
        let items = self.recent();
        if !items.is_empty() {
            agent.add_live_data(&items).await?;
        }
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> FeedEntry {
        FeedEntry {
            title: title.into(),
            summary: "s".into(),
            link: None,
            source: None,
            category: None,
        }
    }

    #[test]
    fn ids_follow_ingestion_order_and_duplicates_are_kept() {
        let ing = LiveIngestor::new(None, Arc::default());
        let a = ing.assign(entry("same"));
        let b = ing.assign(entry("same"));
        assert_eq!(a.id, "live_1");
        assert_eq!(b.id, "live_2");
        assert_eq!(a.source, DEFAULT_SOURCE);
        assert_eq!(a.category, DEFAULT_CATEGORY);
        assert_eq!(a.link, "");
    }

    #[test]
    fn recent_keeps_newest_items() {
        let ing = LiveIngestor::new(None, Arc::default());
        for i in 0..RECENT_CAPACITY + 2 {
            let item = ing.assign(entry(&format!("t{i}")));
            ing.remember(&item);
        }
        let recent = ing.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].id, "live_3");
        assert_eq!(recent.last().unwrap().title, format!("t{}", RECENT_CAPACITY + 1));
    }

    #[tokio::test]
    async fn push_without_agent_is_unavailable() {
        let ing = LiveIngestor::new(None, Arc::default());
        let err = ing.push_to_agent().await.unwrap_err();
        assert_eq!(err.client_code().as_str(), "SERVICE_UNAVAILABLE");
    }
}
