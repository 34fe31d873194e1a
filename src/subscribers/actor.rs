//! # SubscriberActor: one subscriber end-to-end.
//!
//! Runs a single subscriber: acquire a dedicated channel, declare topology,
//! consume, dispatch, acknowledge, and re-subscribe whenever the channel
//! is lost.
//!
//! ## Session loop
//! ```text
//! loop {
//!   ├─► acquire Monitored lease          (blocks until owner is Connected)
//!   ├─► declare exchange / queue / binds (idempotent declares)
//!   ├─► consume(queue, auto_ack)
//!   ├─► publish SubscriberStarted | SubscriberResubscribed
//!   └─► receive loop:
//!         ├─ delivery        ─► dispatch_one()
//!         ├─ monitor fired   ─► release lease, next session
//!         ├─ stream ended    ─► release lease, next session
//!         └─ cancelled       ─► release lease, publish SubscriberStopped, exit
//! }
//! ```
//!
//! ## Rules
//! - The lease is Monitored: subscribers are long-lived and channel loss
//!   must be observable, not silently fatal.
//! - Topology is redeclared on every session; queue declarations are not
//!   assumed to survive a reconnect.
//! - Channel-loss errors during setup are transient (reconnect race) and
//!   roll into the next session; other declare errors are fatal and
//!   surface upward instead of retrying indefinitely.
//! - The lease is released on **every** exit path.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::connection::{ChannelLease, ChannelMonitor, ChannelPolicy, ConnectionHandle};
use crate::error::ClientError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{Delivery, ProtocolError};
use crate::subscribers::dispatch::dispatch_one;
use crate::subscribers::Subscribe;

/// Why the receive loop ended.
enum Exit {
    /// Runtime cancellation; the actor exits.
    Cancelled,
    /// The channel died or the delivery stream ended; start a new session.
    ChannelLost,
}

/// Per-subscriber worker. One actor owns one subscriber instance and its
/// channel lease; deliveries are processed one at a time, in broker order.
pub struct SubscriberActor<S: Subscribe> {
    sub: Arc<S>,
    handle: ConnectionHandle,
    bus: Bus,
}

impl<S: Subscribe> SubscriberActor<S> {
    /// Creates a new subscriber actor.
    pub fn new(sub: Arc<S>, handle: ConnectionHandle, bus: Bus) -> Self {
        Self { sub, handle, bus }
    }

    /// Runs the actor until cancellation or a fatal configuration error.
    ///
    /// Returns `Err` only for fatal errors (topology declare mismatch and
    /// the like); lost channels and connections are recovered by entering
    /// the next session once the owner reconnects.
    pub async fn run(self, runtime_token: CancellationToken) -> Result<(), ClientError> {
        let queue = self.sub.config().queue().to_string();
        let mut sessions: u64 = 0;

        loop {
            if runtime_token.is_cancelled() {
                break;
            }

            let mut lease = tokio::select! {
                res = self.handle.channel(ChannelPolicy::Monitored) => match res {
                    Ok(lease) => lease,
                    // Lost the race with a dying connection; wait for the
                    // owner to bring up the next one.
                    Err(ClientError::Protocol(e)) if e.is_resource_lost() => continue,
                    // Owner is gone: the runtime is stopping.
                    Err(ClientError::ConnectionUnavailable) => break,
                    Err(e) => {
                        self.publish_failed(&queue, &e);
                        return Err(e);
                    }
                },
                _ = runtime_token.cancelled() => break,
            };
            let mut monitor = match lease.take_monitor() {
                Some(monitor) => monitor,
                None => {
                    lease.release().await;
                    continue;
                }
            };

            let mut deliveries = match self.setup(&lease).await {
                Ok(deliveries) => deliveries,
                Err(e) if e.is_resource_lost() => {
                    lease.release().await;
                    continue;
                }
                Err(e) => {
                    let err = ClientError::Protocol(e);
                    self.publish_failed(&queue, &err);
                    lease.release().await;
                    return Err(err);
                }
            };

            sessions += 1;
            let kind = if sessions == 1 {
                EventKind::SubscriberStarted
            } else {
                EventKind::SubscriberResubscribed
            };
            self.bus.publish(Event::now(kind).with_queue(queue.as_str()));

            let exit = self
                .receive_loop(&lease, &mut monitor, &mut deliveries, &runtime_token)
                .await;
            lease.release().await;

            match exit {
                Exit::Cancelled => break,
                Exit::ChannelLost => continue,
            }
        }

        self.bus
            .publish(Event::now(EventKind::SubscriberStopped).with_queue(queue.as_str()));
        Ok(())
    }

    /// Declares the subscriber's topology and registers its consumer.
    ///
    /// Exchange and queue declares are idempotent on the broker side; the
    /// queue is bound once per routing key in the configuration.
    async fn setup(&self, lease: &ChannelLease) -> Result<mpsc::Receiver<Delivery>, ProtocolError> {
        let cfg = self.sub.config();
        let channel = lease.raw_channel();

        channel.declare_exchange(cfg.exchange(), cfg.durable()).await?;
        channel.declare_queue(cfg.queue(), cfg.durable()).await?;
        for routing_key in cfg.routing_keys() {
            channel
                .bind_queue(cfg.queue(), cfg.exchange(), routing_key)
                .await?;
        }
        channel.consume(cfg.queue(), cfg.auto_ack()).await
    }

    /// Processes deliveries until cancellation or channel loss.
    async fn receive_loop(
        &self,
        lease: &ChannelLease,
        monitor: &mut ChannelMonitor,
        deliveries: &mut mpsc::Receiver<Delivery>,
        runtime_token: &CancellationToken,
    ) -> Exit {
        loop {
            tokio::select! {
                _ = runtime_token.cancelled() => return Exit::Cancelled,
                // The ChannelLost event is published by the monitor watcher.
                _ = monitor.lost() => return Exit::ChannelLost,
                msg = deliveries.recv() => match msg {
                    Some(delivery) => {
                        dispatch_one(self.sub.as_ref(), lease, delivery, &self.bus).await;
                    }
                    None => return Exit::ChannelLost,
                },
            }
        }
    }

    fn publish_failed(&self, queue: &str, err: &ClientError) {
        self.bus.publish(
            Event::now(EventKind::SubscriberFailed)
                .with_queue(queue)
                .with_reason(err.to_string()),
        );
    }
}
