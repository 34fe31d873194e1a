//! # Subscriber contract.
//!
//! [`Subscribe`] is the trait application code implements to bind a queue
//! to a handler. The runtime resolves the subscriber's configuration once
//! at construction and then drives the dispatch protocol per delivery:
//! deserialize, invoke, acknowledge.
//!
//! ## Dispatch shape
//! The capability flags of the configuration are resolved ahead of time;
//! the handler always has one signature and receives a [`MessageContext`]
//! whose contents reflect the resolved flags:
//! - `provide_channel = false`: `ctx.channel()` is `None`.
//! - `provide_channel = true`: `ctx.channel()` is the subscriber's **own**
//!   lease (not a fresh one), so handler-issued publishes share connection
//!   resources. Long-running work must not outlive the subscriber's
//!   channel lifetime.
//! - The delivery tag is always available for manual acknowledgement.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use subvisor::{
//!     AckDecision, DeserializeError, HandlerError, MessageContext, Subscribe, SubscriberConfig,
//! };
//!
//! struct Greeter {
//!     config: SubscriberConfig,
//! }
//!
//! #[async_trait]
//! impl Subscribe for Greeter {
//!     type Payload = String;
//!
//!     fn config(&self) -> &SubscriberConfig {
//!         &self.config
//!     }
//!
//!     fn deserialize(&self, body: &[u8]) -> Result<String, DeserializeError> {
//!         String::from_utf8(body.to_vec()).map_err(|e| DeserializeError::new(e.to_string()))
//!     }
//!
//!     async fn on_message(
//!         &self,
//!         payload: String,
//!         _ctx: MessageContext<'_>,
//!     ) -> Result<AckDecision, HandlerError> {
//!         println!("hello, {payload}");
//!         Ok(AckDecision::Ack)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::connection::ChannelLease;
use crate::error::{DeserializeError, HandlerError};
use crate::subscribers::SubscriberConfig;

/// Handler verdict for one delivery.
///
/// Only consulted under `auto_ack = false`; with broker-side auto-ack the
/// decision is observed for error reporting only and no ack call is ever
/// issued by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckDecision {
    /// The runtime immediately acks the delivery tag on the subscriber's
    /// channel.
    Ack,
    /// No ack is sent by the runtime; responsibility transfers to whatever
    /// code path the handler delegated to, which must later call
    /// [`ChannelLease::ack`] with the captured delivery tag. The runtime
    /// does not track or time out pending manual acks.
    ManualDeferred,
}

/// Per-delivery context handed to [`Subscribe::on_message`].
pub struct MessageContext<'a> {
    channel: Option<&'a ChannelLease>,
    delivery_tag: u64,
}

impl<'a> MessageContext<'a> {
    pub(crate) fn new(channel: Option<&'a ChannelLease>, delivery_tag: u64) -> Self {
        Self {
            channel,
            delivery_tag,
        }
    }

    /// The subscriber's own channel lease, present only when the
    /// subscriber is configured with `provide_channel = true`.
    pub fn channel(&self) -> Option<&'a ChannelLease> {
        self.channel
    }

    /// Broker-assigned delivery tag, for manual acknowledgement.
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }
}

/// Contract implemented by application subscriber types.
///
/// One instance serves one queue. The runtime invokes `deserialize` and
/// `on_message` synchronously within the subscriber's own task: one
/// in-flight delivery at a time per subscriber, in broker order.
/// Parallelism across *different* subscribers is the unit of concurrency.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Deserialized payload type.
    type Payload: Send + 'static;

    /// The subscriber's resolved, immutable configuration.
    fn config(&self) -> &SubscriberConfig;

    /// Decodes a raw delivery body.
    ///
    /// On error the delivery is rejected (never silently dropped), the
    /// failure is reported, and the handler is not invoked.
    fn deserialize(&self, body: &[u8]) -> Result<Self::Payload, DeserializeError>;

    /// Handles one deserialized payload.
    ///
    /// Errors (and panics) are caught at the runtime boundary and logged
    /// as dispatch failures; under manual-ack mode they count as a non-ack
    /// and the message remains pending per broker policy.
    async fn on_message(
        &self,
        payload: Self::Payload,
        ctx: MessageContext<'_>,
    ) -> Result<AckDecision, HandlerError>;
}
