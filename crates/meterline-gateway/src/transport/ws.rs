//! Billing notification channel.
//!
//! Lifecycle: `Connecting -> Subscribed -> Streaming -> Closed`.
//! - Connecting: metering unavailable => one `error` frame, close, no subscription
//! - Subscribed: register a delivery queue, send one `snapshot`
//! - Streaming: relay queued events; answer pings; heartbeat + idle timeout
//! - Closed: the subscription guard unregisters exactly once on every path
//!
//! The loop is generic over the socket halves so it can be driven without a
//! real upgrade.

use std::fmt::Display;
use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocketUpgrade, Path, State},
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::Instrument;
use tokio::time::{interval_at, sleep_until, Duration, Instant, MissedTickBehavior};

use meterline_core::error::{MeterError, Result};
use meterline_core::protocol::Notification;

use crate::app_state::AppState;
use crate::config::GatewaySection;
use crate::metering::UsageMeteringService;
use crate::obs::MeterMetrics;
use crate::realtime::SubscriptionGuard;
use crate::transport::codec::{self, Inbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Subscribed,
    Streaming,
    Closed,
}

/// Why a channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelExit {
    /// Metering absent at connect time; never subscribed.
    Unavailable,
    RemoteClosed,
    IdleTimeout,
    /// Registry closed underneath the channel (gateway shutdown).
    Shutdown,
    Fault,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelTimers {
    pub ping_every: Duration,
    pub idle_timeout: Duration,
}

impl From<&GatewaySection> for ChannelTimers {
    fn from(gw: &GatewaySection) -> Self {
        Self {
            ping_every: Duration::from_millis(gw.ping_interval_ms),
            idle_timeout: Duration::from_millis(gw.idle_timeout_ms),
        }
    }
}

// --------------------
// Entry
// --------------------
pub async fn billing_ws(
    State(app): State<AppState>,
    Path(user_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (ws_tx, ws_rx) = socket.split();
        let timers = ChannelTimers::from(&app.cfg().gateway);
        run_channel(app.metering_opt(), app.metrics(), timers, user_id, ws_tx, ws_rx).await;
    })
}

async fn send_note<Si>(ws_tx: &mut Si, note: &Notification) -> Result<()>
where
    Si: Sink<Message> + Unpin,
{
    let msg = codec::encode(note)?;
    ws_tx.send(msg).await.map_err(|_| MeterError::ChannelClosed)
}

/// Best effort: terminal error frame followed by a close frame.
async fn send_fatal<Si>(ws_tx: &mut Si, message: &str)
where
    Si: Sink<Message> + Unpin,
{
    if send_note(ws_tx, &Notification::error(message)).await.is_ok() {
        let _ = ws_tx.send(codec::close_with_error("billing channel error")).await;
    }
}

// --------------------
// Core channel loop
// --------------------
pub async fn run_channel<Si, St, E>(
    metering: Option<Arc<UsageMeteringService>>,
    metrics: Arc<MeterMetrics>,
    timers: ChannelTimers,
    user_id: String,
    ws_tx: Si,
    ws_rx: St,
) -> ChannelExit
where
    Si: Sink<Message> + Unpin,
    St: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    let span = tracing::info_span!("billing_channel", user = %user_id);
    channel_lifecycle(metering, metrics, timers, user_id, ws_tx, ws_rx)
        .instrument(span)
        .await
}

async fn channel_lifecycle<Si, St, E>(
    metering: Option<Arc<UsageMeteringService>>,
    metrics: Arc<MeterMetrics>,
    timers: ChannelTimers,
    user_id: String,
    mut ws_tx: Si,
    mut ws_rx: St,
) -> ChannelExit
where
    Si: Sink<Message> + Unpin,
    St: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    let mut state = ChannelState::Connecting;

    let Some(metering) = metering else {
        metrics.channel_opens.inc(&[("result", "unavailable")]);
        tracing::warn!(?state, "metering unavailable, refusing channel");
        send_fatal(&mut ws_tx, "Billing service unavailable").await;
        return ChannelExit::Unavailable;
    };

    let sub = SubscriptionGuard::new(metering.registry(), metering.subscribe(&user_id));
    state = ChannelState::Subscribed;
    metrics.channel_opens.inc(&[("result", "subscribed")]);
    metrics.channels_active.inc();
    tracing::info!(?state, sub = sub.id(), "channel subscribed");

    let exit = stream_events(&metering, &sub, timers, &user_id, &mut ws_tx, &mut ws_rx, &mut state).await;

    if exit == ChannelExit::Fault {
        metrics.channel_errors.inc(&[("stage", "relay")]);
    }
    metrics.channels_active.dec();
    drop(sub);
    state = ChannelState::Closed;
    tracing::info!(?state, ?exit, "channel closed");
    exit
}

async fn stream_events<Si, St, E>(
    metering: &UsageMeteringService,
    sub: &SubscriptionGuard,
    timers: ChannelTimers,
    user_id: &str,
    ws_tx: &mut Si,
    ws_rx: &mut St,
    state: &mut ChannelState,
) -> ChannelExit
where
    Si: Sink<Message> + Unpin,
    St: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    // ---- snapshot
    let snapshot = match metering.usage_stats(user_id).await {
        Ok(usage_stats) => Notification::Snapshot { usage_stats },
        Err(e) => {
            tracing::error!(error=%e, "snapshot failed");
            send_fatal(ws_tx, &e.to_string()).await;
            return ChannelExit::Fault;
        }
    };
    match send_note(ws_tx, &snapshot).await {
        Ok(()) => {}
        Err(MeterError::ChannelClosed) => return ChannelExit::RemoteClosed,
        Err(e) => {
            send_fatal(ws_tx, &e.to_string()).await;
            return ChannelExit::Fault;
        }
    }
    *state = ChannelState::Streaming;

    // ---- timers
    let mut ping_tick = interval_at(Instant::now() + timers.ping_every, timers.ping_every);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // outbound relay
            next = sub.recv() => {
                let Some(ev) = next else {
                    send_fatal(ws_tx, "billing service shutting down").await;
                    return ChannelExit::Shutdown;
                };
                match send_note(ws_tx, &Notification::Event((*ev).clone())).await {
                    Ok(()) => tracing::trace!(event=%ev.id, backlog = sub.pending(), "event relayed"),
                    Err(MeterError::ChannelClosed) => return ChannelExit::RemoteClosed,
                    Err(e) => {
                        tracing::error!(error=%e, event=%ev.id, "relay failed");
                        send_fatal(ws_tx, &e.to_string()).await;
                        return ChannelExit::Fault;
                    }
                }
            }

            // inbound (liveness only)
            incoming = ws_rx.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!(error=%e, "socket read failed");
                        return ChannelExit::RemoteClosed;
                    }
                    None => return ChannelExit::RemoteClosed,
                };
                last_activity = Instant::now();

                match codec::decode(msg) {
                    Inbound::Ping(payload) => {
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            return ChannelExit::RemoteClosed;
                        }
                    }
                    Inbound::Pong => {}
                    Inbound::Close => {
                        let _ = ws_tx.send(codec::close_normal()).await;
                        return ChannelExit::RemoteClosed;
                    }
                    Inbound::Data { bytes_len } => {
                        tracing::trace!(bytes_len, "ignoring client data frame");
                    }
                }
            }

            // heartbeat
            _ = ping_tick.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    return ChannelExit::RemoteClosed;
                }
            }

            // idle timeout
            _ = sleep_until(last_activity + timers.idle_timeout) => {
                send_fatal(ws_tx, "idle timeout").await;
                return ChannelExit::IdleTimeout;
            }
        }
    }
}
