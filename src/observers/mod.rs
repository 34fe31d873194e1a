//! Event observers for the client runtime.
//!
//! Observers hook into the runtime events broadcast through the
//! [`Bus`](crate::events::Bus): connection transitions, channel lifecycle,
//! subscriber sessions, dispatch failures. They are fan-out consumers with
//! per-observer bounded queues; a slow observer never blocks the runtime.
//!
//! Not to be confused with [`Subscribe`](crate::subscribers::Subscribe),
//! which is the message-queue consumer contract.

mod observe;
mod set;

pub use observe::Observe;
pub use set::ObserverSet;

#[cfg(feature = "logging")]
mod log;
#[cfg(feature = "logging")]
pub use log::LogWriter;
