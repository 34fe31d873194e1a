//! # Protocol client boundary.
//!
//! The wire protocol (framing, handshake) is out of scope for this crate;
//! it is consumed through the object-safe async traits defined here.
//! A production implementation wraps a real client library; tests use an
//! in-memory fake with resource counters.
//!
//! ## Shape
//! ```text
//! Transport::connect(url) ──► Arc<dyn Connection>
//!                                  │ open_channel()
//!                                  ▼
//!                             Arc<dyn Channel> ── declare / bind / consume /
//!                                                 publish / ack / nack
//! ```
//!
//! ## Failure notifications
//! Asynchronous connection-closed and channel-closed notifications are
//! modeled as the `closed()` futures: they complete when the underlying
//! resource is gone, whether it was closed locally or terminated by the
//! broker or network.
//!
//! ## Rules
//! - `close()` is idempotent; closing an already-closed resource is a no-op.
//! - `closed()` completes immediately if the resource is already closed.
//! - Operations on a closed channel fail with
//!   [`ProtocolError::ChannelClosed`], never silently succeed.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One inbound message.
///
/// Created per incoming frame, consumed synchronously by the dispatch step,
/// discarded after ack/nack or hand-off to manual acking.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Raw, opaque message body.
    pub body: Vec<u8>,
    /// Broker-assigned identifier, opaque to this crate, used only for
    /// acknowledgement.
    pub delivery_tag: u64,
}

/// # Errors surfaced by the protocol client.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The broker could not be reached or refused the handshake.
    #[error("connect failed: {reason}")]
    ConnectFailed {
        /// Human-readable reason.
        reason: String,
    },

    /// The connection is closed; no further operations are possible on it.
    #[error("connection closed")]
    ConnectionClosed,

    /// The channel is closed; the operation was not performed.
    #[error("channel closed")]
    ChannelClosed,

    /// A broker-side operation (declare, bind, consume, publish, ack)
    /// was rejected.
    #[error("{op} failed: {reason}")]
    Operation {
        /// Name of the rejected operation.
        op: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

impl ProtocolError {
    /// True for errors that mean the underlying channel or connection is
    /// gone, as opposed to the broker rejecting a well-formed operation.
    pub fn is_resource_lost(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed | ProtocolError::ChannelClosed
        )
    }
}

/// Factory for broker connections.
///
/// The single seam between this crate and a concrete protocol client.
/// Injected into the [`ConnectionOwner`](crate::connection::ConnectionOwner)
/// so tests can substitute a fake.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establishes one connection to the broker at `url`.
    async fn connect(&self, url: &str) -> Result<Arc<dyn Connection>, ProtocolError>;
}

/// A live broker connection.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Opens a new protocol channel multiplexed over this connection.
    async fn open_channel(&self) -> Result<Arc<dyn Channel>, ProtocolError>;

    /// Closes the connection. Idempotent.
    async fn close(&self);

    /// Completes when the connection is closed, locally or remotely.
    async fn closed(&self);

    /// True while the connection is usable.
    fn is_open(&self) -> bool;
}

/// A protocol channel: the unit of topology declaration, consumption, and
/// acknowledgement.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Declares a topic exchange. Idempotent: safe if the exchange already
    /// exists with matching attributes; a mismatch is an
    /// [`ProtocolError::Operation`] error.
    async fn declare_exchange(&self, name: &str, durable: bool) -> Result<(), ProtocolError>;

    /// Declares a queue with the given durability flag. Idempotent under
    /// matching attributes, like [`Channel::declare_exchange`].
    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), ProtocolError>;

    /// Binds `queue` to `exchange` for one routing key.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ProtocolError>;

    /// Registers a consumer on `queue` and returns its delivery stream.
    ///
    /// With `auto_ack = true` the broker considers each delivery settled on
    /// send; with `auto_ack = false` every delivery must be acked or nacked
    /// explicitly. Deliveries arrive in broker order. The stream ends when
    /// the channel closes.
    async fn consume(
        &self,
        queue: &str,
        auto_ack: bool,
    ) -> Result<mpsc::Receiver<Delivery>, ProtocolError>;

    /// Publishes `payload` to `exchange` under `routing_key`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), ProtocolError>;

    /// Acknowledges the delivery with the given tag.
    async fn ack(&self, delivery_tag: u64) -> Result<(), ProtocolError>;

    /// Negatively acknowledges the delivery with the given tag.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), ProtocolError>;

    /// Closes the channel, deregistering any consumers. Idempotent.
    async fn close(&self);

    /// Completes when the channel is closed, locally or remotely.
    async fn closed(&self);

    /// True while the channel is usable.
    fn is_open(&self) -> bool;
}
