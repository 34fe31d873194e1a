//! Channel lease behavior: release semantics, scoped acquisition, and the
//! linked/monitored supervision policies.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use common::FakeBroker;
use subvisor::{
    Bus, ChannelPolicy, ClientError, Config, ConnectionHandle, ConnectionOwner, EventKind,
    PolicyKind, Transport,
};

fn spawn_owner(
    broker: &Arc<FakeBroker>,
) -> (ConnectionHandle, Bus, CancellationToken, JoinHandle<()>) {
    let bus = Bus::new(64);
    let transport: Arc<dyn Transport> = Arc::clone(broker) as Arc<dyn Transport>;
    let (owner, handle) = ConnectionOwner::new(&Config::new("amqp://test"), transport, bus.clone());
    let token = CancellationToken::new();
    let join = tokio::spawn(owner.run(token.clone()));
    (handle, bus, token, join)
}

fn drain_kinds(rx: &mut tokio::sync::broadcast::Receiver<subvisor::Event>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    kinds
}

#[tokio::test(start_paused = true)]
async fn open_and_release_for_each_policy() {
    let broker = FakeBroker::new();
    let (handle, _bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    for policy in [
        ChannelPolicy::Unsupervised,
        ChannelPolicy::Linked(CancellationToken::new()),
        ChannelPolicy::Monitored,
    ] {
        let expected = policy.kind();
        let lease = handle.channel(policy).await.expect("lease");
        assert_eq!(lease.kind(), expected);
        assert_eq!(broker.channels_open(), 1);

        lease.release().await;
        assert!(lease.is_released());
        assert_eq!(broker.channels_open(), 0);
    }

    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn release_is_idempotent() {
    let broker = FakeBroker::new();
    let (handle, bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let lease = handle
        .channel(ChannelPolicy::Unsupervised)
        .await
        .expect("lease");
    let mut rx = bus.subscribe();

    lease.release().await;
    lease.release().await;
    lease.release().await;

    let released = drain_kinds(&mut rx)
        .into_iter()
        .filter(|k| *k == EventKind::ChannelReleased)
        .count();
    assert_eq!(released, 1);
    assert_eq!(broker.channels_open(), 0);

    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn dropping_an_unreleased_lease_closes_its_channel() {
    let broker = FakeBroker::new();
    let (handle, bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let mut rx = bus.subscribe();
    let lease = handle
        .channel(ChannelPolicy::Unsupervised)
        .await
        .expect("lease");
    assert_eq!(broker.channels_open(), 1);

    drop(lease);
    // The backstop close runs on a spawned task.
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.channels_open(), 0);
    assert!(drain_kinds(&mut rx)
        .into_iter()
        .any(|k| k == EventKind::ChannelReleased));

    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn with_channel_releases_on_success() {
    let broker = FakeBroker::new();
    let (handle, _bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let out = handle
        .with_channel(ChannelPolicy::Unsupervised, |lease| {
            Box::pin(async move {
                lease.publish("events", "user.signup", b"{}").await?;
                Ok(42_u32)
            })
        })
        .await
        .expect("body succeeds");
    assert_eq!(out, 42);
    assert_eq!(broker.channels_open(), 0);
    assert_eq!(broker.published().len(), 1);

    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn with_channel_releases_on_error() {
    let broker = FakeBroker::new();
    let (handle, _bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let err = handle
        .with_channel(ChannelPolicy::Unsupervised, |_lease| {
            Box::pin(async move { Err::<(), _>(ClientError::ConnectionUnavailable) })
        })
        .await
        .expect_err("body fails");
    assert!(matches!(err, ClientError::ConnectionUnavailable));
    assert_eq!(broker.channels_open(), 0);

    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn monitored_channel_loss_fires_monitor_with_matching_id() {
    let broker = FakeBroker::new();
    let (handle, bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let mut lease = handle
        .channel(ChannelPolicy::Monitored)
        .await
        .expect("lease");
    let mut monitor = lease.take_monitor().expect("monitored lease");
    let expected_id = monitor.id();
    let mut rx = bus.subscribe();

    broker.kill_last_channel();
    assert_eq!(monitor.lost().await, Some(expected_id));

    // The loss is also observable on the bus, with the same identifiers.
    let lost = time::timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.expect("bus open");
            if ev.kind == EventKind::ChannelLost {
                return ev;
            }
        }
    })
    .await
    .expect("ChannelLost event");
    assert_eq!(lost.monitor, Some(expected_id));
    assert_eq!(lost.lease, Some(lease.id()));

    lease.release().await;
    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn released_monitor_never_fires() {
    let broker = FakeBroker::new();
    let (handle, _bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let mut lease = handle
        .channel(ChannelPolicy::Monitored)
        .await
        .expect("lease");
    let mut monitor = lease.take_monitor().expect("monitored lease");

    lease.release().await;
    broker.kill_last_channel();
    assert_eq!(monitor.lost().await, None);

    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn linked_channel_loss_cancels_the_caller() {
    let broker = FakeBroker::new();
    let (handle, _bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let caller = CancellationToken::new();
    let lease = handle
        .channel(ChannelPolicy::Linked(caller.clone()))
        .await
        .expect("lease");
    assert_eq!(lease.kind(), PolicyKind::Linked);

    broker.kill_last_channel();
    time::timeout(Duration::from_secs(5), caller.cancelled())
        .await
        .expect("caller token cancelled");

    lease.release().await;
    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn released_linked_lease_leaves_caller_alone() {
    let broker = FakeBroker::new();
    let (handle, _bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let caller = CancellationToken::new();
    let lease = handle
        .channel(ChannelPolicy::Linked(caller.clone()))
        .await
        .expect("lease");

    lease.release().await;
    time::sleep(Duration::from_secs(1)).await;
    assert!(!caller.is_cancelled());

    token.cancel();
    join.await.expect("owner task");
}

#[tokio::test(start_paused = true)]
async fn leases_do_not_survive_connection_loss() {
    let broker = FakeBroker::new();
    let (handle, _bus, token, join) = spawn_owner(&broker);
    handle.connected().await.expect("owner connects");

    let lease = handle
        .channel(ChannelPolicy::Unsupervised)
        .await
        .expect("lease");
    assert_eq!(lease.epoch(), 1);

    broker.kill_connection();
    let err = lease
        .publish("events", "user.signup", b"{}")
        .await
        .expect_err("dead channel");
    assert!(matches!(err, ClientError::Protocol(_)));

    lease.release().await;
    token.cancel();
    join.await.expect("owner task");
}
