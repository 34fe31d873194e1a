//! Runtime core: orchestration and lifecycle.
//!
//! The only public API from this module is [`Supervisor`], which wires the
//! connection owner, subscriber actors, observer fan-out, and graceful
//! shutdown.
//!
//! Internal modules:
//! - [`supervisor`]: spawns and joins the owner and subscriber actors;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod shutdown;
mod supervisor;

pub use supervisor::Supervisor;
