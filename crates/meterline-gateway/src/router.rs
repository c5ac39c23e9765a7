//! Axum router wiring.
//!
//! REST under `/api`, the billing notification channel at
//! `/ws/billing/:user_id`, and ops endpoints at the root.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{api::handlers, app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/billing/:user_id", get(transport::ws::billing_ws))
        .route("/api/health", get(handlers::health))
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/:session_id/history", get(handlers::chat_history))
        .route("/api/agent/stats", get(handlers::agent_stats))
        .route("/api/research", post(handlers::research))
        .route("/api/upload", post(handlers::upload))
        .route("/api/research/upload", post(handlers::research_upload))
        .route("/api/research/live", post(handlers::research_live))
        .route("/api/research/stats", get(handlers::agent_stats))
        .route("/api/live", get(handlers::live_refresh))
        .route("/api/live/ingest", post(handlers::live_ingest))
        .route("/api/usage/:user_id", get(handlers::usage_stats))
        .route("/api/usage/:user_id/history", get(handlers::usage_history))
        .route("/api/dashboard/:user_id", get(handlers::dashboard))
        .route("/api/costs", get(handlers::costs))
        .route("/api/costs/:kind", get(handlers::credit_cost))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
