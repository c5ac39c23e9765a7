#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{sink, stream, Sink, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use meterline_core::kinds;
use meterline_core::protocol::Notification;
use meterline_gateway::metering::{BalancePolicy, CostSchedule, CreditLedger, UsageMeteringService};
use meterline_gateway::obs::MeterMetrics;
use meterline_gateway::realtime::SubscriberRegistry;
use meterline_gateway::transport::{run_channel, ChannelExit, ChannelTimers};

const WAIT: Duration = Duration::from_secs(2);

/// Client end of an in-memory socket.
struct Client {
    to_server: mpsc::UnboundedSender<Message>,
    from_server: mpsc::UnboundedReceiver<Message>,
}

impl Client {
    async fn next(&mut self) -> Message {
        timeout(WAIT, self.from_server.recv())
            .await
            .expect("server frame in time")
            .expect("server still open")
    }

    async fn next_note(&mut self) -> Notification {
        loop {
            match self.next().await {
                Message::Text(s) => return Notification::decode(&s).unwrap(),
                Message::Ping(_) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }
}

type ServerTx = std::pin::Pin<Box<dyn Sink<Message, Error = ()> + Send>>;
type ServerRx = std::pin::Pin<Box<dyn Stream<Item = Result<Message, Infallible>> + Send>>;

fn socket_pair() -> (Client, ServerTx, ServerRx) {
    let (to_client, from_server) = mpsc::unbounded_channel::<Message>();
    let (to_server, from_client) = mpsc::unbounded_channel::<Message>();

    let tx: ServerTx = Box::pin(sink::unfold(to_client, |tx, msg: Message| async move {
        tx.send(msg).map_err(|_| ())?;
        Ok::<_, ()>(tx)
    }));
    let rx: ServerRx = Box::pin(stream::unfold(from_client, |mut rx| async move {
        rx.recv().await.map(|m| (Ok::<_, Infallible>(m), rx))
    }));

    (Client { to_server, from_server }, tx, rx)
}

fn service() -> Arc<UsageMeteringService> {
    let ledger = CreditLedger::new(Arc::new(CostSchedule::default()), 10, BalancePolicy::EnforceFloor);
    Arc::new(UsageMeteringService::new(
        ledger,
        Arc::new(SubscriberRegistry::new(64)),
        Arc::new(MeterMetrics::default()),
    ))
}

fn quiet_timers() -> ChannelTimers {
    ChannelTimers {
        ping_every: Duration::from_secs(3600),
        idle_timeout: Duration::from_secs(7200),
    }
}

fn open(
    metering: Option<Arc<UsageMeteringService>>,
    metrics: Arc<MeterMetrics>,
    timers: ChannelTimers,
    user: &str,
) -> (Client, JoinHandle<ChannelExit>) {
    let (client, tx, rx) = socket_pair();
    let handle = tokio::spawn(run_channel(metering, metrics, timers, user.to_string(), tx, rx));
    (client, handle)
}

async fn wait_subscribed(svc: &UsageMeteringService, user: &str, n: usize) {
    timeout(WAIT, async {
        while svc.registry().subscriber_count(user) < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("channel subscribed in time");
}

#[tokio::test]
async fn unavailable_metering_sends_error_then_closes() {
    let metrics = Arc::new(MeterMetrics::default());
    let (mut client, handle) = open(None, Arc::clone(&metrics), quiet_timers(), "alice");

    match client.next_note().await {
        Notification::Error { message } => assert_eq!(message, "Billing service unavailable"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(matches!(client.next().await, Message::Close(_)));
    assert_eq!(handle.await.unwrap(), ChannelExit::Unavailable);
    assert_eq!(metrics.channel_opens.get(&[("result", "unavailable")]), 1);
}

#[tokio::test]
async fn snapshot_then_events_in_debit_order() {
    let svc = service();
    let metrics = Arc::new(MeterMetrics::default());
    let (mut client, handle) = open(Some(Arc::clone(&svc)), Arc::clone(&metrics), quiet_timers(), "alice");

    match client.next_note().await {
        Notification::Snapshot { usage_stats } => {
            assert_eq!(usage_stats.credits_remaining, 10);
            assert_eq!(usage_stats.total_questions, 0);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
    wait_subscribed(&svc, "alice", 1).await;
    assert_eq!(metrics.channels_active.get(), 1);

    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(svc.track_usage("alice", kinds::QUESTION, &format!("q{i}")).await.unwrap().id);
    }
    // other users never leak in
    svc.track_usage("bob", kinds::QUESTION, "b").await.unwrap();

    for id in ids {
        match client.next_note().await {
            Notification::Event(ev) => assert_eq!(ev.id, id),
            other => panic!("expected event, got {other:?}"),
        }
    }

    client.to_server.send(Message::Close(None)).unwrap();
    assert_eq!(handle.await.unwrap(), ChannelExit::RemoteClosed);
    assert_eq!(svc.registry().subscriber_count("alice"), 0);
    assert_eq!(metrics.channels_active.get(), 0);
}

#[tokio::test]
async fn late_channel_snapshot_reflects_prior_debits() {
    let svc = service();
    for _ in 0..3 {
        svc.track_usage("alice", kinds::QUESTION, "q").await.unwrap();
    }

    let (mut client, handle) = open(Some(Arc::clone(&svc)), Arc::default(), quiet_timers(), "alice");
    match client.next_note().await {
        Notification::Snapshot { usage_stats } => {
            assert_eq!(usage_stats.credits_remaining, 7);
            assert_eq!(usage_stats.total_questions, 3);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    let ev = svc.track_usage("alice", kinds::REPORT, "r").await.unwrap();
    match client.next_note().await {
        Notification::Event(got) => {
            assert_eq!(got.id, ev.id);
            assert_eq!(got.credits_used, 3);
        }
        other => panic!("expected event, got {other:?}"),
    }

    drop(client);
    assert_eq!(handle.await.unwrap(), ChannelExit::RemoteClosed);
}

#[tokio::test]
async fn two_channels_for_one_user_both_receive() {
    let svc = service();
    let (mut a, ha) = open(Some(Arc::clone(&svc)), Arc::default(), quiet_timers(), "alice");
    let (mut b, hb) = open(Some(Arc::clone(&svc)), Arc::default(), quiet_timers(), "alice");
    a.next_note().await;
    b.next_note().await;
    wait_subscribed(&svc, "alice", 2).await;

    let ev = svc.track_usage("alice", kinds::QUESTION, "q").await.unwrap();
    for c in [&mut a, &mut b] {
        match c.next_note().await {
            Notification::Event(got) => assert_eq!(got.id, ev.id),
            other => panic!("expected event, got {other:?}"),
        }
    }

    drop(a);
    assert_eq!(ha.await.unwrap(), ChannelExit::RemoteClosed);
    assert_eq!(svc.registry().subscriber_count("alice"), 1);
    drop(b);
    assert_eq!(hb.await.unwrap(), ChannelExit::RemoteClosed);
    assert_eq!(svc.registry().subscriber_count("alice"), 0);
}

#[tokio::test]
async fn shutdown_closes_channel_with_error() {
    let svc = service();
    let (mut client, handle) = open(Some(Arc::clone(&svc)), Arc::default(), quiet_timers(), "alice");
    client.next_note().await;
    wait_subscribed(&svc, "alice", 1).await;

    svc.shutdown();
    assert!(matches!(client.next_note().await, Notification::Error { .. }));
    assert!(matches!(client.next().await, Message::Close(_)));
    assert_eq!(handle.await.unwrap(), ChannelExit::Shutdown);
}

#[tokio::test]
async fn client_ping_is_answered_and_data_frames_ignored() {
    let svc = service();
    let (mut client, handle) = open(Some(Arc::clone(&svc)), Arc::default(), quiet_timers(), "alice");
    client.next_note().await;

    client.to_server.send(Message::Text("hello".into())).unwrap();
    client.to_server.send(Message::Ping(vec![7])).unwrap();
    match client.next().await {
        Message::Pong(p) => assert_eq!(p, vec![7]),
        other => panic!("expected pong, got {other:?}"),
    }

    client.to_server.send(Message::Close(None)).unwrap();
    assert!(matches!(client.next().await, Message::Close(_)));
    assert_eq!(handle.await.unwrap(), ChannelExit::RemoteClosed);
}

#[tokio::test]
async fn heartbeat_pings_and_idle_timeout() {
    let svc = service();
    let timers = ChannelTimers {
        ping_every: Duration::from_millis(50),
        idle_timeout: Duration::from_millis(300),
    };
    let (mut client, handle) = open(Some(Arc::clone(&svc)), Arc::default(), timers, "alice");
    assert!(matches!(client.next().await, Message::Text(_)));
    assert!(matches!(client.next().await, Message::Ping(_)));

    // silent client: server pings do not count as activity
    let exit = timeout(WAIT, handle).await.expect("channel ends").unwrap();
    assert_eq!(exit, ChannelExit::IdleTimeout);
    assert_eq!(svc.registry().subscriber_count("alice"), 0);
}
