//! # Supervisor: wires the connection owner, subscriber actors, and
//! observer fan-out, and drives graceful shutdown.
//!
//! The [`Supervisor`] owns the event bus, an [`ObserverSet`], and the
//! global runtime configuration. It spawns the connection owner and one
//! actor per declared subscriber, handles OS signals, and enforces the
//! shutdown grace window.
//!
//! ## High-level architecture
//! ```text
//! Inputs:
//!   Config + Transport + observers ──► Supervisor::new
//!   add_subscriber::<S>(sub)        ──► planned actor per subscriber
//!
//! run():
//!   - observer_listener(): Bus.subscribe() ─► ObserverSet::emit(&Event)
//!   - spawn ConnectionOwner::run(child token)
//!   - spawn SubscriberActor::run(child token) per subscriber
//!
//! Event flow:
//!   Owner / actors ── publish(Event) ──► Bus ──► listener ──► ObserverSet
//!
//! Shutdown path:
//!   shutdown::wait_for_shutdown_signal()
//!             └─► Bus.publish(ShutdownRequested)
//!             └─► runtime_token.cancel()  → propagates to child tokens
//!             └─► wait_all_with_grace(cfg.grace):
//!                    ├─ Ok (all joined)  → Bus.publish(AllStoppedWithin)
//!                    └─ Timeout exceeded → Bus.publish(GraceExceeded)
//!                                          Err(GraceExceeded { stuck })
//! ```
//!
//! ## Rules
//! - Actors release their channel leases before exiting; the owner closes
//!   the live connection when cancelled. Shutdown leaves no channel or
//!   connection resource behind.
//! - A subscriber's fatal error does not stop the other subscribers; the
//!   first such error is returned once the run ends.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::{ConnectionHandle, ConnectionOwner};
use crate::core::shutdown;
use crate::error::ClientError;
use crate::events::{Bus, Event, EventKind};
use crate::observers::{Observe, ObserverSet};
use crate::protocol::Transport;
use crate::subscribers::{Subscribe, SubscriberActor};

type SubscriberFuture = BoxFuture<'static, Result<(), ClientError>>;
type SpawnFn = Box<dyn FnOnce(ConnectionHandle, Bus, CancellationToken) -> SubscriberFuture + Send>;

/// A subscriber actor waiting to be spawned by [`Supervisor::run`].
struct Planned {
    queue: String,
    spawn: SpawnFn,
}

/// Coordinates the connection owner, subscriber actors, and event
/// delivery (via [`ObserverSet`]).
///
/// ## Example
/// ```no_run
/// use std::sync::Arc;
/// use subvisor::{Config, Supervisor, Transport};
///
/// # use subvisor::{AckDecision, DeserializeError, HandlerError, MessageContext, Subscribe, SubscriberConfig};
/// # struct MySubscriber { config: SubscriberConfig }
/// # #[async_trait::async_trait]
/// # impl Subscribe for MySubscriber {
/// #     type Payload = String;
/// #     fn config(&self) -> &SubscriberConfig { &self.config }
/// #     fn deserialize(&self, body: &[u8]) -> Result<String, DeserializeError> {
/// #         String::from_utf8(body.to_vec()).map_err(|e| DeserializeError::new(e.to_string()))
/// #     }
/// #     async fn on_message(&self, _p: String, _ctx: MessageContext<'_>) -> Result<AckDecision, HandlerError> {
/// #         Ok(AckDecision::Ack)
/// #     }
/// # }
/// # async fn demo(transport: Arc<dyn Transport>, sub: Arc<MySubscriber>) -> Result<(), subvisor::ClientError> {
/// let mut sup = Supervisor::new(Config::new("amqp://localhost:5672"), transport, vec![]);
/// sup.add_subscriber(sub);
/// sup.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    observers: Arc<ObserverSet>,
    transport: Arc<dyn Transport>,
    planned: Vec<Planned>,
}

impl Supervisor {
    /// Creates a new supervisor with the given config, protocol transport,
    /// and observers.
    pub fn new(
        cfg: Config,
        transport: Arc<dyn Transport>,
        observers: Vec<Arc<dyn Observe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let observers = Arc::new(ObserverSet::new(observers));
        Self {
            cfg,
            bus,
            observers,
            transport,
            planned: Vec::new(),
        }
    }

    /// The runtime event bus (for additional listeners).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Declares a subscriber to be run. The subscriber's configuration is
    /// already resolved and validated at this point (its construction
    /// required a [`SubscriberConfig`](crate::subscribers::SubscriberConfig)).
    pub fn add_subscriber<S: Subscribe>(&mut self, sub: Arc<S>) {
        let queue = sub.config().queue().to_string();
        let spawn: SpawnFn = Box::new(move |handle, bus, token| {
            Box::pin(async move { SubscriberActor::new(sub, handle, bus).run(token).await })
        });
        self.planned.push(Planned { queue, spawn });
    }

    /// Runs the connection owner and all declared subscribers until either:
    /// - all subscriber actors exit on their own, or
    /// - a termination signal arrives → graceful shutdown (may end with
    ///   [`ClientError::GraceExceeded`]).
    pub async fn run(mut self) -> Result<(), ClientError> {
        let runtime_token = CancellationToken::new();
        self.observer_listener();

        let (owner, handle) =
            ConnectionOwner::new(&self.cfg, Arc::clone(&self.transport), self.bus.clone());
        let owner_join = tokio::spawn(owner.run(runtime_token.child_token()));

        let running: Arc<Mutex<BTreeSet<String>>> = Arc::new(Mutex::new(BTreeSet::new()));
        let mut set: JoinSet<Result<(), ClientError>> = JoinSet::new();
        for planned in std::mem::take(&mut self.planned) {
            let child = runtime_token.child_token();
            let fut = (planned.spawn)(handle.clone(), self.bus.clone(), child);
            let running = Arc::clone(&running);
            let queue = planned.queue;
            if let Ok(mut names) = running.lock() {
                names.insert(queue.clone());
            }
            set.spawn(async move {
                let res = fut.await;
                if let Ok(mut names) = running.lock() {
                    names.remove(&queue);
                }
                res
            });
        }

        let result = self.drive_shutdown(&mut set, &runtime_token, &running).await;

        runtime_token.cancel();
        let _ = owner_join.await;
        result
    }

    /// Subscribes to the bus and forwards events to the observer set
    /// (fire-and-forget).
    fn observer_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.observers);
        tokio::spawn(async move {
            while let Ok(ev) = rx.recv().await {
                set.emit(&ev);
            }
        });
    }

    /// Waits until either all actors finish or a shutdown signal arrives.
    async fn drive_shutdown(
        &self,
        set: &mut JoinSet<Result<(), ClientError>>,
        runtime_token: &CancellationToken,
        running: &Arc<Mutex<BTreeSet<String>>>,
    ) -> Result<(), ClientError> {
        tokio::select! {
            sig = shutdown::wait_for_shutdown_signal() => {
                let _ = sig;
                self.bus.publish(Event::now(EventKind::ShutdownRequested));
                runtime_token.cancel();
                self.wait_all_with_grace(set, running).await
            }
            res = Self::drain(set) => res,
        }
    }

    /// Joins all subscriber actors, keeping the first fatal error.
    async fn drain(set: &mut JoinSet<Result<(), ClientError>>) -> Result<(), ClientError> {
        let mut first_err: Option<ClientError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                // A panicking actor is already visible through events;
                // dispatch-level panics never reach here.
                Err(_join_err) => {}
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Waits for all actors to finish within the configured grace period.
    ///
    /// Publishes [`EventKind::AllStoppedWithin`] on success, or
    /// [`EventKind::GraceExceeded`] on timeout and returns
    /// [`ClientError::GraceExceeded`] with the list of stuck subscribers.
    async fn wait_all_with_grace(
        &self,
        set: &mut JoinSet<Result<(), ClientError>>,
        running: &Arc<Mutex<BTreeSet<String>>>,
    ) -> Result<(), ClientError> {
        let grace = self.cfg.grace;
        match time::timeout(grace, Self::drain(set)).await {
            Ok(res) => {
                self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                res
            }
            Err(_elapsed) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                let stuck = running
                    .lock()
                    .map(|names| names.iter().cloned().collect())
                    .unwrap_or_default();
                Err(ClientError::GraceExceeded { grace, stuck })
            }
        }
    }
}
