//! # Runtime events emitted by the connection owner and subscriber actors.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Connection events**: connect attempts, establishment, loss, retries
//! - **Channel events**: lease opened/released/lost
//! - **Subscriber events**: start, resubscribe, stop, fatal failure
//! - **Delivery events**: rejected payloads, dispatch failures
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! queue names, lease/monitor identifiers, and delivery tags.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use subvisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::DispatchFailed)
//!     .with_queue("orders")
//!     .with_reason("boom")
//!     .with_delivery_tag(7);
//!
//! assert_eq!(ev.kind, EventKind::DispatchFailed);
//! assert_eq!(ev.queue.as_deref(), Some("orders"));
//! assert_eq!(ev.delivery_tag, Some(7));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Connection events ===
    /// Connection owner entered the connecting state and is attempting to
    /// reach the broker.
    ///
    /// Sets: `attempt`, `at`, `seq`.
    Connecting,

    /// Connection established.
    ///
    /// Sets: `attempt`, `at`, `seq`.
    Connected,

    /// A connect attempt failed; a retry is scheduled.
    ///
    /// Sets: `attempt`, `reason`, `at`, `seq`.
    ConnectFailed,

    /// Next connect attempt scheduled after the fixed reconnect interval.
    ///
    /// Sets: `attempt`, `delay_ms`, `at`, `seq`.
    RetryScheduled,

    /// The live connection was lost; all leases minted under it are dead
    /// and the owner re-enters the connecting loop.
    ///
    /// Sets: `reason`, `at`, `seq`.
    ConnectionLost,

    // === Channel events ===
    /// A channel lease was opened.
    ///
    /// Sets: `lease`, `policy`, `at`, `seq`.
    ChannelOpened,

    /// A channel lease was released (explicitly or by the drop backstop).
    ///
    /// Sets: `lease`, `at`, `seq`.
    ChannelReleased,

    /// A monitored channel died before its lease was released.
    ///
    /// Sets: `lease`, `monitor`, `at`, `seq`.
    ChannelLost,

    // === Subscriber events ===
    /// Subscriber declared its topology and started consuming.
    ///
    /// Sets: `queue`, `at`, `seq`.
    SubscriberStarted,

    /// Subscriber re-declared its topology and resumed consuming after a
    /// lost channel.
    ///
    /// Sets: `queue`, `at`, `seq`.
    SubscriberResubscribed,

    /// Subscriber stopped cleanly (cancellation).
    ///
    /// Sets: `queue`, `at`, `seq`.
    SubscriberStopped,

    /// Subscriber failed fatally (topology declare mismatch or similar)
    /// and will not be restarted.
    ///
    /// Sets: `queue`, `reason`, `at`, `seq`.
    SubscriberFailed,

    // === Delivery events ===
    /// A delivery body failed to deserialize; the handler was never
    /// invoked and the delivery was rejected.
    ///
    /// Sets: `queue`, `delivery_tag`, `reason`, `at`, `seq`.
    DeliveryRejected,

    /// The handler failed (error or panic) while processing a delivery,
    /// or a requested acknowledgement could not be sent.
    ///
    /// Sets: `queue`, `delivery_tag`, `reason`, `at`, `seq`.
    DispatchFailed,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed).
    ///
    /// Sets: `at`, `seq`.
    ShutdownRequested,

    /// All subscribers stopped within the configured grace period.
    ///
    /// Sets: `at`, `seq`.
    AllStoppedWithin,

    /// Grace period exceeded; some subscribers did not stop in time.
    ///
    /// Sets: `at`, `seq`.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Queue name of the subscriber involved, if applicable.
    pub queue: Option<Arc<str>>,
    /// Human-readable reason (errors, loss details, etc.).
    pub reason: Option<Arc<str>>,
    /// Lifetime policy label of the lease involved.
    pub policy: Option<&'static str>,
    /// Connect attempt count (starting from 1).
    pub attempt: Option<u64>,
    /// Delay before the next connect attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Lease identifier, if applicable.
    pub lease: Option<u64>,
    /// Monitor identifier, if applicable.
    pub monitor: Option<u64>,
    /// Broker-assigned delivery tag, if applicable.
    pub delivery_tag: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            queue: None,
            reason: None,
            policy: None,
            attempt: None,
            delay_ms: None,
            lease: None,
            monitor: None,
            delivery_tag: None,
        }
    }

    /// Attaches a queue name.
    #[inline]
    pub fn with_queue(mut self, queue: impl Into<Arc<str>>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a lease lifetime-policy label.
    #[inline]
    pub fn with_policy(mut self, policy: &'static str) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Attaches a connect attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a lease identifier.
    #[inline]
    pub fn with_lease(mut self, id: u64) -> Self {
        self.lease = Some(id);
        self
    }

    /// Attaches a monitor identifier.
    #[inline]
    pub fn with_monitor(mut self, id: u64) -> Self {
        self.monitor = Some(id);
        self
    }

    /// Attaches a delivery tag.
    #[inline]
    pub fn with_delivery_tag(mut self, tag: u64) -> Self {
        self.delivery_tag = Some(tag);
        self
    }
}
