//! Subscriber runtime: configuration, contract, actor, and dispatch.
//!
//! Internal modules:
//! - [`config`]: immutable per-subscriber configuration and its builder;
//! - [`subscribe`]: the contract application subscriber types implement;
//! - [`actor`]: per-subscriber worker loop with resubscribe-on-loss;
//! - [`dispatch`]: the per-delivery dispatch protocol.

mod actor;
mod config;
mod dispatch;
mod subscribe;

pub use actor::SubscriberActor;
pub use config::{SubscriberConfig, SubscriberConfigBuilder};
pub use subscribe::{AckDecision, MessageContext, Subscribe};
