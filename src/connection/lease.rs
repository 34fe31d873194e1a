//! # Channel leases: a protocol channel plus its lifetime policy.
//!
//! The channel broker half of the connection layer. [`open`] translates a
//! [`ChannelPolicy`] into a [`ChannelLease`] with the correct supervision
//! relationship; [`ChannelLease::release`] tears it down deterministically.
//!
//! ## Lifetime policies
//! ```text
//! Unsupervised  channel ──(nothing)──────────── caller releases, or leaks
//! Linked        channel.closed() ─► cancel(caller token)      fail-together
//! Monitored     channel.closed() ─► ChannelMonitor fires id   caller decides
//! ```
//!
//! ## Rules
//! - `release()` is idempotent; releasing twice is a no-op, not an error.
//! - A released Monitored lease never fires its monitor.
//! - Leases do not survive a connection replacement: operations on a lease
//!   whose channel died fail with an explicit error from the protocol
//!   layer, never silently.
//! - Dropping an unreleased lease closes its channel best-effort (backstop
//!   for cancelled tasks); `release()` remains the contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{Channel, Connection};

/// Global counters for lease and monitor identifiers.
static LEASE_SEQ: AtomicU64 = AtomicU64::new(1);
static MONITOR_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier correlating a monitored lease with its eventual
/// termination notification.
pub type MonitorId = u64;

/// Requested lifetime policy for a channel lease.
#[derive(Clone, Debug)]
pub enum ChannelPolicy {
    /// No supervision relationship; the caller is fully responsible for
    /// calling [`ChannelLease::release`]. Leaking the lease is a caller
    /// bug: the channel stays alive consuming broker resources until
    /// explicitly closed.
    Unsupervised,

    /// Fail-together semantics: if the channel dies first, the given
    /// caller token is cancelled. Used when the caller cannot meaningfully
    /// continue without the channel.
    Linked(CancellationToken),

    /// The channel's death produces an asynchronous [`ChannelMonitor`]
    /// notification without terminating the caller; the caller decides
    /// whether to recreate the channel.
    Monitored,
}

impl ChannelPolicy {
    /// Returns the policy tag without the payload.
    pub fn kind(&self) -> PolicyKind {
        match self {
            ChannelPolicy::Unsupervised => PolicyKind::Unsupervised,
            ChannelPolicy::Linked(_) => PolicyKind::Linked,
            ChannelPolicy::Monitored => PolicyKind::Monitored,
        }
    }
}

/// Lifetime policy tag carried by a lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Unsupervised,
    Linked,
    Monitored,
}

impl PolicyKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PolicyKind::Unsupervised => "unsupervised",
            PolicyKind::Linked => "linked",
            PolicyKind::Monitored => "monitored",
        }
    }
}

/// Termination notification handle for a Monitored lease.
///
/// Fires at most once, and only if the channel dies before the lease is
/// released.
#[derive(Debug)]
pub struct ChannelMonitor {
    id: MonitorId,
    rx: oneshot::Receiver<MonitorId>,
}

impl ChannelMonitor {
    /// The identifier that will be carried by the notification.
    pub fn id(&self) -> MonitorId {
        self.id
    }

    /// Waits for the channel to die.
    ///
    /// Returns `Some(id)` with the matching monitor identifier if the
    /// channel terminated while the lease was live, or `None` if the lease
    /// was released first (no notification is ever emitted in that case).
    pub async fn lost(&mut self) -> Option<MonitorId> {
        match (&mut self.rx).await {
            Ok(id) => Some(id),
            Err(_) => None,
        }
    }
}

/// A protocol channel plus its lifetime policy.
///
/// Created on demand by [`open`], owned by the requester, destroyed by an
/// explicit [`ChannelLease::release`] call. The lease also exposes the
/// publish/ack surface handlers need when the subscriber's own channel is
/// passed into them.
pub struct ChannelLease {
    id: u64,
    epoch: u64,
    kind: PolicyKind,
    channel: Arc<dyn Channel>,
    /// Cancelled on release; stops the supervision watcher without firing it.
    guard: CancellationToken,
    released: AtomicBool,
    bus: Bus,
    monitor: Option<ChannelMonitor>,
}

impl std::fmt::Debug for ChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLease")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .field("kind", &self.kind)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ChannelLease {
    /// Process-unique lease identifier (used in events).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection epoch this lease was minted under. A lease never
    /// survives a connection replacement; comparing epochs tells a caller
    /// whether its lease predates the current connection.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Lifetime policy tag.
    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// True once the lease was released.
    pub fn is_released(&self) -> bool {
        self.released.load(AtomicOrdering::SeqCst)
    }

    /// Takes the termination monitor of a Monitored lease.
    ///
    /// Returns `None` for other policies or if already taken.
    pub fn take_monitor(&mut self) -> Option<ChannelMonitor> {
        self.monitor.take()
    }

    /// Raw protocol channel, for the subscriber runtime's topology and
    /// consume calls.
    pub(crate) fn raw_channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Publishes `payload` to `exchange` under `routing_key` on this lease's
    /// channel.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), ClientError> {
        self.channel.publish(exchange, routing_key, payload).await?;
        Ok(())
    }

    /// Acknowledges the delivery with the given tag on this lease's channel.
    pub async fn ack(&self, delivery_tag: u64) -> Result<(), ClientError> {
        self.channel.ack(delivery_tag).await?;
        Ok(())
    }

    /// Negatively acknowledges the delivery with the given tag.
    pub async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), ClientError> {
        self.channel.nack(delivery_tag, requeue).await?;
        Ok(())
    }

    /// Releases the lease: stops its supervision watcher and closes the
    /// channel. Idempotent: releasing an already-released lease is a
    /// no-op.
    pub async fn release(&self) {
        if self.released.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        self.guard.cancel();
        self.channel.close().await;
        self.bus
            .publish(Event::now(EventKind::ChannelReleased).with_lease(self.id));
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        if self.released.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        self.guard.cancel();
        // Backstop for leases dropped without release (e.g. cancelled
        // tasks). Close cannot be awaited here, so hand it to the runtime
        // when one is available.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let channel = Arc::clone(&self.channel);
            let bus = self.bus.clone();
            let id = self.id;
            handle.spawn(async move {
                channel.close().await;
                bus.publish(Event::now(EventKind::ChannelReleased).with_lease(id));
            });
        }
    }
}

/// Opens a channel on `conn` under the given lifetime policy.
///
/// Fails with [`ClientError::ConnectionUnavailable`] if the connection is
/// not open at call time; there is no implicit queuing or blocking here
/// beyond what the connection owner itself performs.
pub(crate) async fn open(
    conn: &Arc<dyn Connection>,
    epoch: u64,
    policy: ChannelPolicy,
    bus: &Bus,
) -> Result<ChannelLease, ClientError> {
    if !conn.is_open() {
        return Err(ClientError::ConnectionUnavailable);
    }
    let channel = conn.open_channel().await?;
    let id = LEASE_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
    let kind = policy.kind();
    let guard = CancellationToken::new();

    let monitor = match policy {
        ChannelPolicy::Unsupervised => None,
        ChannelPolicy::Linked(caller) => {
            let ch = Arc::clone(&channel);
            let g = guard.clone();
            tokio::spawn(async move {
                // Biased, guard first: a released lease must never cancel
                // its caller even if the channel close lands in the same
                // poll.
                tokio::select! {
                    biased;
                    _ = g.cancelled() => {}
                    _ = ch.closed() => caller.cancel(),
                }
            });
            None
        }
        ChannelPolicy::Monitored => {
            let monitor_id = MONITOR_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
            let (tx, rx) = oneshot::channel();
            let ch = Arc::clone(&channel);
            let g = guard.clone();
            let b = bus.clone();
            tokio::spawn(async move {
                // Biased, guard first: a released lease must never fire its
                // monitor even if the channel close lands in the same poll.
                tokio::select! {
                    biased;
                    _ = g.cancelled() => {}
                    _ = ch.closed() => {
                        b.publish(
                            Event::now(EventKind::ChannelLost)
                                .with_lease(id)
                                .with_monitor(monitor_id),
                        );
                        let _ = tx.send(monitor_id);
                    }
                }
            });
            Some(ChannelMonitor { id: monitor_id, rx })
        }
    };

    bus.publish(
        Event::now(EventKind::ChannelOpened)
            .with_lease(id)
            .with_policy(kind.as_label()),
    );

    Ok(ChannelLease {
        id,
        epoch,
        kind,
        channel,
        guard,
        released: AtomicBool::new(false),
        bus: bus.clone(),
        monitor,
    })
}
