//! # ConnectionOwner: the single supervised connection to the broker.
//!
//! Owns exactly one live connection at a time, transparently reconnecting
//! on failure, and serves as the sole source of channels.
//!
//! ## State machine
//! ```text
//! Disconnected ──► Connecting ──► Connected ──(failure)──► Disconnected
//!                     ▲  │                                      │
//!                     │  └─(connect error, fixed-interval sleep)┘
//!                     └─────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Reconnect attempts are **serialized**: never more than one in-flight
//!   connect attempt (the owner is a single loop).
//! - A failed connect attempt leaves the owner in `Connecting`; it retries
//!   after the fixed reconnect interval.
//! - Every `Connected → Disconnected → Connected` transition is observable
//!   through the handle (and the event bus), so subscriber actors can
//!   re-establish their channels and redeclare their topology.
//! - Channel requests are served on an independent control path (the
//!   `watch` state); they never block the owner's ability to process the
//!   next failure notification.
//! - Cancellation closes the live connection (if any) and stops further
//!   reconnects.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::lease::{self, ChannelLease, ChannelPolicy};
use crate::error::ClientError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{Connection, ProtocolError, Transport};

/// Connection owner status, as observed through [`ConnectionHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// No connection, no attempt in flight.
    Disconnected,
    /// An attempt is in flight or a retry is scheduled.
    Connecting,
    /// A live connection is available.
    Connected,
}

/// Owner-published state; readers observe it only through the handle.
#[derive(Clone)]
struct ConnState {
    status: Status,
    /// Incremented for every newly established connection. Leases carry
    /// the epoch they were minted under.
    epoch: u64,
    conn: Option<Arc<dyn Connection>>,
}

/// Outcome of one connect attempt.
enum Attempt {
    Connected(Arc<dyn Connection>),
    Failed(String),
    Cancelled,
}

/// Maintains the process's single broker connection for its lifetime.
///
/// Constructed together with its [`ConnectionHandle`] via
/// [`ConnectionOwner::new`]; [`ConnectionOwner::run`] is the actor loop,
/// typically spawned by the [`Supervisor`](crate::core::Supervisor).
pub struct ConnectionOwner {
    url: String,
    reconnect_interval: Duration,
    connect_timeout: Option<Duration>,
    transport: Arc<dyn Transport>,
    bus: Bus,
    tx: watch::Sender<ConnState>,
}

impl ConnectionOwner {
    /// Creates the owner and the cloneable handle readers use.
    pub fn new(cfg: &Config, transport: Arc<dyn Transport>, bus: Bus) -> (Self, ConnectionHandle) {
        let (tx, rx) = watch::channel(ConnState {
            status: Status::Disconnected,
            epoch: 0,
            conn: None,
        });
        let owner = Self {
            url: cfg.url.clone(),
            reconnect_interval: cfg.reconnect_interval,
            connect_timeout: cfg.connect_timeout_opt(),
            transport,
            bus: bus.clone(),
            tx,
        };
        (owner, ConnectionHandle { rx, bus })
    }

    /// Runs the owner until cancellation.
    ///
    /// The loop is the serialization point for connect attempts: one
    /// attempt at a time, a fixed-interval sleep between failures, and an
    /// immediate re-entry into `Connecting` after a lost connection.
    pub async fn run(self, runtime_token: CancellationToken) {
        let mut attempt: u64 = 0;
        let mut epoch: u64 = 0;

        loop {
            if runtime_token.is_cancelled() {
                break;
            }
            attempt += 1;
            self.set_state(Status::Connecting, epoch, None);
            self.bus
                .publish(Event::now(EventKind::Connecting).with_attempt(attempt));

            match self.try_connect(&runtime_token).await {
                Attempt::Cancelled => break,
                Attempt::Failed(reason) => {
                    self.bus.publish(
                        Event::now(EventKind::ConnectFailed)
                            .with_attempt(attempt)
                            .with_reason(reason),
                    );
                    self.bus.publish(
                        Event::now(EventKind::RetryScheduled)
                            .with_attempt(attempt)
                            .with_delay(self.reconnect_interval),
                    );
                    let sleep = time::sleep(self.reconnect_interval);
                    tokio::pin!(sleep);
                    tokio::select! {
                        _ = &mut sleep => {}
                        _ = runtime_token.cancelled() => break,
                    }
                }
                Attempt::Connected(conn) => {
                    epoch += 1;
                    self.set_state(Status::Connected, epoch, Some(Arc::clone(&conn)));
                    self.bus
                        .publish(Event::now(EventKind::Connected).with_attempt(attempt));
                    attempt = 0;

                    tokio::select! {
                        _ = conn.closed() => {
                            // All leases minted under this connection are
                            // now invalid; their operations surface
                            // explicit channel-closed errors.
                            self.bus.publish(
                                Event::now(EventKind::ConnectionLost)
                                    .with_reason("connection closed"),
                            );
                            self.set_state(Status::Disconnected, epoch, None);
                        }
                        _ = runtime_token.cancelled() => {
                            conn.close().await;
                            break;
                        }
                    }
                }
            }
        }
        self.set_state(Status::Disconnected, epoch, None);
    }

    /// One connect attempt, bounded by the configured timeout and
    /// cancellable at any point.
    async fn try_connect(&self, runtime_token: &CancellationToken) -> Attempt {
        let connect = async {
            match self.connect_timeout {
                Some(dur) => match time::timeout(dur, self.transport.connect(&self.url)).await {
                    Ok(res) => res,
                    Err(_elapsed) => Err(ProtocolError::ConnectFailed {
                        reason: format!("timed out after {dur:?}"),
                    }),
                },
                None => self.transport.connect(&self.url).await,
            }
        };
        tokio::pin!(connect);

        tokio::select! {
            res = &mut connect => match res {
                Ok(conn) => Attempt::Connected(conn),
                Err(e) => Attempt::Failed(e.to_string()),
            },
            _ = runtime_token.cancelled() => Attempt::Cancelled,
        }
    }

    fn set_state(&self, status: Status, epoch: u64, conn: Option<Arc<dyn Connection>>) {
        self.tx.send_modify(|s| {
            s.status = status;
            s.epoch = epoch;
            s.conn = conn;
        });
    }
}

/// Read-side handle to the connection owner.
///
/// Cheap to clone; every component that needs channels receives one by
/// injection rather than reaching for a process global.
#[derive(Clone)]
pub struct ConnectionHandle {
    rx: watch::Receiver<ConnState>,
    bus: Bus,
}

impl ConnectionHandle {
    /// Current owner status.
    pub fn status(&self) -> Status {
        self.rx.borrow().status
    }

    /// Epoch of the current (or last) connection.
    pub fn epoch(&self) -> u64 {
        self.rx.borrow().epoch
    }

    /// Waits until the owner is connected.
    ///
    /// Fails only if the owner is gone (runtime stopped).
    pub async fn connected(&self) -> Result<(), ClientError> {
        let mut rx = self.rx.clone();
        rx.wait_for(|s| s.status == Status::Connected)
            .await
            .map_err(|_| ClientError::ConnectionUnavailable)?;
        Ok(())
    }

    /// Opens a channel under the given lifetime policy, waiting for the
    /// owner to be connected first (blocking acquisition).
    ///
    /// A connection can die before the owner observes it; the watch state
    /// then still reads `Connected` with a dead connection inside. Such
    /// stale snapshots are skipped by re-waiting for a newer epoch, so
    /// [`ClientError::ConnectionUnavailable`] here means the owner itself
    /// is gone (runtime stopped), never a reconnect in progress.
    pub async fn channel(&self, policy: ChannelPolicy) -> Result<ChannelLease, ClientError> {
        let mut rx = self.rx.clone();
        let mut stale_epoch: u64 = 0;
        loop {
            let (conn, epoch) = {
                let state = rx
                    .wait_for(|s| s.status == Status::Connected && s.epoch > stale_epoch)
                    .await
                    .map_err(|_| ClientError::ConnectionUnavailable)?;
                (state.conn.clone(), state.epoch)
            };
            match conn {
                Some(conn) if conn.is_open() => {
                    match lease::open(&conn, epoch, policy.clone(), &self.bus).await {
                        // Lost the race between the liveness check and the
                        // channel open; wait for the next connection.
                        Err(ClientError::ConnectionUnavailable) => stale_epoch = epoch,
                        res => return res,
                    }
                }
                _ => stale_epoch = epoch,
            }
        }
    }

    /// Fail-fast variant of [`ConnectionHandle::channel`]: errors with
    /// [`ClientError::ConnectionUnavailable`] instead of waiting when the
    /// owner is disconnected or still connecting.
    pub async fn try_channel(&self, policy: ChannelPolicy) -> Result<ChannelLease, ClientError> {
        let (conn, epoch) = {
            let state = self.rx.borrow();
            if state.status != Status::Connected {
                return Err(ClientError::ConnectionUnavailable);
            }
            match &state.conn {
                Some(c) => (Arc::clone(c), state.epoch),
                None => return Err(ClientError::ConnectionUnavailable),
            }
        };
        lease::open(&conn, epoch, policy, &self.bus).await
    }

    /// Scoped acquisition: opens a channel, invokes `body` with it, and
    /// releases the lease on every exit path (the drop backstop covers
    /// abnormal termination of `body`).
    ///
    /// ## Example
    /// ```no_run
    /// # use subvisor::{ChannelPolicy, ClientError, ConnectionHandle};
    /// # async fn demo(handle: &ConnectionHandle) -> Result<(), ClientError> {
    /// handle
    ///     .with_channel(ChannelPolicy::Unsupervised, |lease| {
    ///         Box::pin(async move { lease.publish("events", "user.signup", b"{}").await })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_channel<T>(
        &self,
        policy: ChannelPolicy,
        body: impl for<'a> FnOnce(&'a ChannelLease) -> BoxFuture<'a, Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let lease = self.channel(policy).await?;
        let res = body(&lease).await;
        lease.release().await;
        res
    }
}
