//! meterline gateway
//!
//! - REST: /api/* (billable actions, usage views)
//! - WebSocket: /ws/billing/:user_id (snapshot + live billing events)
//! - Ops: /healthz, /readyz, /metrics

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use meterline_gateway::{app_state, collab, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error=%e, "meterline-gateway exited with error");
        std::process::exit(1);
    }
}

async fn run() -> meterline_core::Result<()> {
    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg.gateway.listen.parse().map_err(|e| {
        meterline_core::MeterError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}"))
    })?;

    let agent: Arc<dyn collab::ResearchAgent> = Arc::new(collab::OfflineAgent::new());
    let state = app_state::AppState::new(cfg, Some(agent)).await;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config=%path, "meterline-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| meterline_core::MeterError::Internal(format!("bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|e| meterline_core::MeterError::Internal(format!("server failed: {e}")))?;

    tracing::info!("meterline-gateway stopped");
    Ok(())
}

async fn shutdown_signal(state: app_state::AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error=%e, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown requested, draining channels");
    state.begin_drain();
}
