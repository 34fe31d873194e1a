//! # Per-delivery dispatch protocol.
//!
//! Executes one delivery end-to-end: deserialize, invoke the handler with
//! the context implied by the resolved configuration, acknowledge per
//! policy.
//!
//! ## Flow
//! ```text
//! deserialize(body)
//!   ├─ Err ─► publish DeliveryRejected, nack (manual mode), handler never runs
//!   └─ Ok  ─► on_message(payload, ctx)
//!               ├─ panic / Err ─► publish DispatchFailed
//!               │                 (manual mode: non-ack, message stays pending)
//!               └─ Ok(decision)
//!                     ├─ auto_ack ─► nothing to do (broker settled on delivery)
//!                     ├─ Ack ──────► lease.ack(tag)
//!                     └─ ManualDeferred ─► nothing; responsibility transferred
//! ```
//!
//! ## Rules
//! - Exactly one terminal outcome per delivery: rejected, failed, or
//!   settled per the ack policy. Nothing is silently dropped.
//! - Payload-level failures are never retried here; redelivery is the
//!   broker's decision, driven by ack/nack.
//! - Handler panics are isolated; a panicking handler never takes the
//!   subscriber actor down.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::connection::ChannelLease;
use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::Delivery;
use crate::subscribers::{AckDecision, MessageContext, Subscribe};

/// Runs the dispatch protocol for one delivery on the subscriber's lease.
pub(crate) async fn dispatch_one<S: Subscribe>(
    sub: &S,
    lease: &ChannelLease,
    delivery: Delivery,
    bus: &Bus,
) {
    let cfg = sub.config();
    let tag = delivery.delivery_tag;

    let payload = match sub.deserialize(&delivery.body) {
        Ok(payload) => payload,
        Err(e) => {
            let err = DispatchError::Deserialize(e);
            bus.publish(
                Event::now(EventKind::DeliveryRejected)
                    .with_queue(cfg.queue())
                    .with_delivery_tag(tag)
                    .with_reason(err.to_string()),
            );
            // Reject without requeue: a payload that does not parse will
            // not parse on redelivery either.
            if !cfg.auto_ack() {
                if let Err(nack_err) = lease.nack(tag, false).await {
                    bus.publish(
                        Event::now(EventKind::DispatchFailed)
                            .with_queue(cfg.queue())
                            .with_delivery_tag(tag)
                            .with_reason(format!("nack failed: {nack_err}")),
                    );
                }
            }
            return;
        }
    };

    let ctx = MessageContext::new(cfg.provide_channel().then_some(lease), tag);
    let outcome = AssertUnwindSafe(sub.on_message(payload, ctx))
        .catch_unwind()
        .await;

    let decision = match outcome {
        Err(_panic) => {
            bus.publish(
                Event::now(EventKind::DispatchFailed)
                    .with_queue(cfg.queue())
                    .with_delivery_tag(tag)
                    .with_reason("handler panicked"),
            );
            return;
        }
        Ok(Err(e)) => {
            let err = DispatchError::Handler(e);
            bus.publish(
                Event::now(EventKind::DispatchFailed)
                    .with_queue(cfg.queue())
                    .with_delivery_tag(tag)
                    .with_reason(err.to_string()),
            );
            return;
        }
        Ok(Ok(decision)) => decision,
    };

    if cfg.auto_ack() {
        // Broker settled the delivery on send; the decision was observed
        // only for error reporting.
        return;
    }
    match decision {
        AckDecision::Ack => {
            if let Err(e) = lease.ack(tag).await {
                bus.publish(
                    Event::now(EventKind::DispatchFailed)
                        .with_queue(cfg.queue())
                        .with_delivery_tag(tag)
                        .with_reason(format!("ack failed: {e}")),
                );
            }
        }
        AckDecision::ManualDeferred => {}
    }
}
