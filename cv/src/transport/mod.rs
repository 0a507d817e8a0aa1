//! Broadcast transport
//!
//! Every connected peer receives every frame. The sender is identified by
//! the link that emitted the frame, never by anything in the payload, so
//! consumers must do their own "is this for me" filtering.

mod hub;

use serde_json::Value;

use crate::error::TransportError;

pub use hub::{BroadcastHub, DEFAULT_CHANNEL_CAPACITY, Frame, Inbound, LinkSender, PeerLink};

/// Outbound side of the broadcast channel
pub trait Transport: Send + Sync {
    /// Send an encoded envelope to every other connected peer
    fn broadcast(&self, body: Value) -> Result<(), TransportError>;
}
