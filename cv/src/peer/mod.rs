//! Per-process protocol runtime
//!
//! A `Peer` is an actor owning one participant's coordinator and relay.
//! Local code talks to it through a cloneable `PeerHandle`.

mod core;
mod handle;
mod messages;

pub use core::Peer;
pub use handle::PeerHandle;
pub use messages::{PeerMetrics, PeerRequest};
