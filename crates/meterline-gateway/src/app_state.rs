//! Shared application state for the meterline gateway.
//!
//! Every capability is resolved once at startup. A missing metering service
//! or research agent is recorded as `None` and reported as
//! `ServiceUnavailable` at the point of use, never re-checked per call.

use std::sync::Arc;

use meterline_core::error::{MeterError, Result};

use crate::collab::ResearchAgent;
use crate::config::MeterConfig;
use crate::live::LiveIngestor;
use crate::metering::UsageMeteringService;
use crate::obs::MeterMetrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: MeterConfig,
    metering: Option<Arc<UsageMeteringService>>,
    agent: Option<Arc<dyn ResearchAgent>>,
    live: LiveIngestor,
    metrics: Arc<MeterMetrics>,
}

impl AppState {
    /// Build the metering service from config. A failure (e.g. unreadable
    /// journal) leaves the gateway up with metering unavailable.
    pub async fn new(cfg: MeterConfig, agent: Option<Arc<dyn ResearchAgent>>) -> Self {
        let metrics = Arc::new(MeterMetrics::default());
        let metering = match UsageMeteringService::from_config(&cfg.billing, &cfg.channels, Arc::clone(&metrics)).await {
            Ok(svc) => {
                tracing::info!(
                    starting_balance = cfg.billing.starting_balance,
                    policy = ?svc.ledger().policy(),
                    kinds = ?svc.schedule().kinds(),
                    "metering service ready"
                );
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::error!(error=%e, "metering service failed to start; billable routes disabled");
                None
            }
        };
        Self::from_parts(cfg, metering, agent, metrics)
    }

    pub fn from_parts(
        cfg: MeterConfig,
        metering: Option<Arc<UsageMeteringService>>,
        agent: Option<Arc<dyn ResearchAgent>>,
        metrics: Arc<MeterMetrics>,
    ) -> Self {
        if agent.is_none() {
            tracing::warn!("no research agent configured");
        }
        let live = LiveIngestor::new(agent.clone(), Arc::clone(&metrics));
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metering,
                agent,
                live,
                metrics,
            }),
        }
    }

    pub fn cfg(&self) -> &MeterConfig {
        &self.inner.cfg
    }

    pub fn metering(&self) -> Result<Arc<UsageMeteringService>> {
        self.inner
            .metering
            .clone()
            .ok_or_else(|| MeterError::ServiceUnavailable("Billing service unavailable".into()))
    }

    pub fn metering_opt(&self) -> Option<Arc<UsageMeteringService>> {
        self.inner.metering.clone()
    }

    pub fn agent(&self) -> Result<Arc<dyn ResearchAgent>> {
        self.inner
            .agent
            .clone()
            .ok_or_else(|| MeterError::ServiceUnavailable("Research agent not available".into()))
    }

    pub fn has_agent(&self) -> bool {
        self.inner.agent.is_some()
    }

    pub fn live(&self) -> &LiveIngestor {
        &self.inner.live
    }

    pub fn metrics(&self) -> Arc<MeterMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Registry counters exposed next to the metric families.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let Some(m) = &self.inner.metering else {
            return vec![("meterline_metering_available", 0)];
        };
        let reg = m.registry();
        vec![
            ("meterline_metering_available", 1),
            ("meterline_events_published_total", reg.published_count()),
            ("meterline_events_delivered_total", reg.delivered_count()),
            ("meterline_events_dropped_total", reg.dropped_count()),
            ("meterline_subscribers", reg.total_subscribers() as u64),
            ("meterline_accounts", m.ledger().account_count() as u64),
        ]
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Stop accepting work and close every notification channel.
    pub fn begin_drain(&self) {
        self.inner.metrics.set_draining();
        if let Some(m) = &self.inner.metering {
            m.shutdown();
        }
    }
}
