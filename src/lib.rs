//! # subvisor
//!
//! **Subvisor** is a resilient client-side runtime for topic-routed message
//! queues (AMQP-style publish/subscribe).
//!
//! It maintains one shared broker connection per process, automatically
//! reestablishes it after failure, and offers a declarative subscriber
//! abstraction that binds a queue to a handler with configurable
//! acknowledgement and channel-provisioning policy. The wire protocol
//! itself is out of scope and consumed through the [`protocol`] traits.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │  Subscribe   │   │  Subscribe   │   │  Subscribe   │
//!  │ (user sub #1)│   │ (user sub #2)│   │ (user sub #3)│
//!  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!         ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (runtime orchestrator)                                │
//! │  - Bus (broadcast events)                                         │
//! │  - ObserverSet (fans out to user observers)                       │
//! │  - spawns ConnectionOwner + one SubscriberActor per subscriber    │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//! ┌──────────────┐  ┌────────────────┐  ┌────────────────┐    │
//! │ConnectionOwner│ │SubscriberActor │  │SubscriberActor │    │
//! │(reconnect    │  │(session loop)  │  │(session loop)  │    │
//! │ loop)        │  └───────┬────────┘  └───────┬────────┘    │
//! └──────┬───────┘          │ channel(Monitored)│             │
//!        │    ConnectionHandle ◄────────────────┘             │
//!        │ Publishes:          Publishes:                     │
//!        │ - Connecting        - SubscriberStarted            │
//!        │ - Connected         - ChannelLost                  │
//!        │ - ConnectionLost    - DispatchFailed               │
//!        ▼                     ▼                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                        ┌────────────────────────┐
//!                        │   observer_listener    │
//!                        │    (in Supervisor)     │
//!                        └───────────┬────────────┘
//!                                    ▼
//!                               ObserverSet
//!                            (per-observer queues)
//! ```
//!
//! ### Connection lifecycle
//! ```text
//! Disconnected ──► Connecting ──► Connected ──(failure)──► Disconnected
//!                     ▲  │                                      │
//!                     │  └──(connect error, 30s fixed sleep)────┤
//!                     └─────────────────────────────────────────┘
//!
//! - one connect attempt in flight at any instant
//! - channels are handed out only while Connected
//! - leases never survive a connection replacement
//! ```
//!
//! ### Subscriber dispatch
//! ```text
//! Delivery ──► deserialize(body)
//!                ├─ Err ─► reject/nack, report, handler never invoked
//!                └─ Ok  ─► on_message(payload, ctx)
//!                            ├─ ctx.channel(): Some(own lease) iff provide_channel
//!                            └─ AckDecision:
//!                                 ├─ auto_ack     ─► runtime never acks
//!                                 ├─ Ack          ─► exactly one ack(tag)
//!                                 └─ ManualDeferred ─► zero acks from runtime
//! ```
//!
//! ## Features
//! | Area               | Description                                                        | Key types / traits                         |
//! |--------------------|--------------------------------------------------------------------|--------------------------------------------|
//! | **Connection**     | Single supervised connection with fixed-interval reconnect.        | [`ConnectionOwner`], [`ConnectionHandle`]  |
//! | **Channels**       | Leases under unsupervised/linked/monitored lifetime policies.      | [`ChannelLease`], [`ChannelPolicy`]        |
//! | **Subscribers**    | Declarative queue-to-handler binding with ack policy.              | [`Subscribe`], [`SubscriberConfig`]        |
//! | **Observability**  | Broadcast events with non-blocking observer fan-out.               | [`Event`], [`Observe`], [`ObserverSet`]    |
//! | **Errors**         | Typed errors for lifecycle and per-delivery failures.              | [`ClientError`], [`DispatchError`]         |
//! | **Protocol seam**  | Object-safe traits over the underlying client library.             | [`Transport`], [`Connection`], [`Channel`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use subvisor::{
//!     AckDecision, Config, DeserializeError, HandlerError, MessageContext, Subscribe,
//!     SubscriberConfig, Supervisor, Transport,
//! };
//!
//! struct Signups {
//!     config: SubscriberConfig,
//! }
//!
//! #[async_trait]
//! impl Subscribe for Signups {
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
//!         println!("signup: {payload}");
//!         Ok(AckDecision::Ack)
//!     }
//! }
//!
//! async fn run(transport: Arc<dyn Transport>) -> Result<(), subvisor::ClientError> {
//!     let config = SubscriberConfig::builder()
//!         .queue("signups")
//!         .exchange("events")
//!         .routing_key("user.signup")
//!         .build()?;
//!
//!     let mut sup = Supervisor::new(Config::new("amqp://localhost:5672"), transport, vec![]);
//!     sup.add_subscriber(Arc::new(Signups { config }));
//!     sup.run().await
//! }
//! ```

mod config;
mod connection;
mod core;
mod error;
mod events;
mod observers;
pub mod protocol;
mod subscribers;

// ---- Public re-exports ----

pub use crate::config::Config;
pub use crate::connection::{
    ChannelLease, ChannelMonitor, ChannelPolicy, ConnectionHandle, ConnectionOwner, MonitorId,
    PolicyKind, Status,
};
pub use crate::core::Supervisor;
pub use crate::error::{ClientError, DeserializeError, DispatchError, HandlerError};
pub use crate::events::{Bus, Event, EventKind};
pub use crate::observers::{Observe, ObserverSet};
pub use crate::protocol::{Channel, Connection, Delivery, ProtocolError, Transport};
pub use crate::subscribers::{
    AckDecision, MessageContext, Subscribe, SubscriberActor, SubscriberConfig,
    SubscriberConfigBuilder,
};

// Optional: expose a simple built-in logging observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use crate::observers::LogWriter;
