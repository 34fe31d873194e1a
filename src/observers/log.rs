//! # Simple logging observer for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [connecting] attempt=1
//! [connect-failed] attempt=1 err="connection refused"
//! [retry] attempt=1 delay_ms=30000
//! [connected] attempt=2
//! [channel-opened] lease=1 policy=monitored
//! [subscriber-started] queue=orders
//! [delivery-rejected] queue=orders tag=7 err="invalid utf-8"
//! [channel-lost] lease=1 monitor=1
//! [subscriber-resubscribed] queue=orders
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::observers::Observe;

/// Simple stdout logging observer.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use; implement a custom [`Observe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::Connecting => {
                println!("[connecting] attempt={:?}", e.attempt);
            }
            EventKind::Connected => {
                println!("[connected] attempt={:?}", e.attempt);
            }
            EventKind::ConnectFailed => {
                println!("[connect-failed] attempt={:?} err={:?}", e.attempt, e.reason);
            }
            EventKind::RetryScheduled => {
                println!("[retry] attempt={:?} delay_ms={:?}", e.attempt, e.delay_ms);
            }
            EventKind::ConnectionLost => {
                println!("[connection-lost] err={:?}", e.reason);
            }
            EventKind::ChannelOpened => {
                println!("[channel-opened] lease={:?} policy={:?}", e.lease, e.policy);
            }
            EventKind::ChannelReleased => {
                println!("[channel-released] lease={:?}", e.lease);
            }
            EventKind::ChannelLost => {
                println!("[channel-lost] lease={:?} monitor={:?}", e.lease, e.monitor);
            }
            EventKind::SubscriberStarted => {
                println!("[subscriber-started] queue={:?}", e.queue);
            }
            EventKind::SubscriberResubscribed => {
                println!("[subscriber-resubscribed] queue={:?}", e.queue);
            }
            EventKind::SubscriberStopped => {
                println!("[subscriber-stopped] queue={:?}", e.queue);
            }
            EventKind::SubscriberFailed => {
                println!("[subscriber-failed] queue={:?} err={:?}", e.queue, e.reason);
            }
            EventKind::DeliveryRejected => {
                println!(
                    "[delivery-rejected] queue={:?} tag={:?} err={:?}",
                    e.queue, e.delivery_tag, e.reason
                );
            }
            EventKind::DispatchFailed => {
                println!(
                    "[dispatch-failed] queue={:?} tag={:?} err={:?}",
                    e.queue, e.delivery_tag, e.reason
                );
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::AllStoppedWithin => {
                println!("[all-stopped-within-grace]");
            }
            EventKind::GraceExceeded => {
                println!("[grace-exceeded]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
