//! Error types used by the subvisor runtime and subscribers.
//!
//! This module defines two main error enums:
//!
//! - [`ClientError`]: errors raised by the connection/channel lifecycle
//!   and the runtime itself.
//! - [`DispatchError`]: errors raised while processing a single delivery.
//!
//! Both types provide an `as_label` helper for logging/metrics. Lost
//! connections and channels are recovered internally (reconnect loop,
//! resubscribe loop) and surface as [`Event`](crate::events::Event)s rather
//! than as returned errors; the variants here are the ones a caller can
//! actually observe at an API boundary.

use std::time::Duration;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// # Errors produced by the client runtime.
///
/// These represent failures of the connection/channel lifecycle or of
/// subscriber construction, as opposed to per-delivery failures
/// ([`DispatchError`]).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClientError {
    /// No live connection was available when a channel or publish was
    /// requested in fail-fast mode.
    ///
    /// The background reconnect loop keeps running; the caller may retry
    /// or use the blocking acquisition form instead.
    #[error("connection unavailable")]
    ConnectionUnavailable,

    /// A required subscriber setting is missing.
    ///
    /// Queue, exchange, and routing keys have no defaults; this is fatal
    /// at subscriber construction, never at first message.
    #[error("missing subscriber configuration: {missing}")]
    Configuration {
        /// Name of the missing field.
        missing: &'static str,
    },

    /// The underlying protocol client reported an error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Shutdown grace period was exceeded; some subscribers remained
    /// stuck and had to be force-terminated.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Queue names of subscribers that did not stop in time.
        stuck: Vec<String>,
    },
}

impl ClientError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::ConnectionUnavailable => "connection_unavailable",
            ClientError::Configuration { .. } => "configuration_error",
            ClientError::Protocol(_) => "protocol_error",
            ClientError::GraceExceeded { .. } => "grace_exceeded",
        }
    }
}

/// Payload deserialization failure reported by [`Subscribe::deserialize`].
///
/// [`Subscribe::deserialize`]: crate::subscribers::Subscribe::deserialize
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct DeserializeError {
    /// Human-readable reason.
    pub reason: String,
}

impl DeserializeError {
    /// Creates a deserialization error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Handler failure reported by [`Subscribe::on_message`].
///
/// [`Subscribe::on_message`]: crate::subscribers::Subscribe::on_message
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct HandlerError {
    /// Human-readable reason.
    pub reason: String,
}

impl HandlerError {
    /// Creates a handler error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// # Errors produced while processing one delivery.
///
/// Payload-level errors are never retried by the runtime: redelivery is a
/// broker-level decision driven by ack/nack, not a local loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The delivery body could not be deserialized; the handler was never
    /// invoked and the delivery was rejected.
    #[error("deserialization failed: {0}")]
    Deserialize(#[from] DeserializeError),

    /// The handler returned an error; under manual-ack mode the message
    /// is left unacknowledged.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Deserialize(_) => "dispatch_deserialize",
            DispatchError::Handler(_) => "dispatch_handler",
        }
    }
}
