//! Connection lifecycle: the supervised owner and the channel broker.
//!
//! Internal modules:
//! - [`owner`]: single reconnecting connection owner and its read handle;
//! - [`lease`]: channel leases with lifetime policies and explicit release.

mod lease;
mod owner;

pub use lease::{ChannelLease, ChannelMonitor, ChannelPolicy, MonitorId, PolicyKind};
pub use owner::{ConnectionHandle, ConnectionOwner, Status};
