//! Runtime events: the bus and the event model.
//!
//! Every failure named in the error taxonomy is either returned to the
//! caller or published here; there is no silent failure path.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
