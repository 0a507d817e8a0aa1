//! Error taxonomy for the query protocol
//!
//! Nothing here is fatal to the process. Validation and unknown-event errors
//! are surfaced to the user and the operation is dropped; stale references
//! are expected under duplicate delivery and are swallowed.

use thiserror::Error;

/// Errors raised by the coordinator, relay, and dialog layers
#[derive(Debug, Error)]
pub enum CanvassError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("No live query or dialog with id {0}")]
    StaleReference(String),

    #[error("Peer channel closed")]
    ChannelClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CanvassError {
    /// Malformed payload for a known event
    pub fn malformed(event: &str, details: impl AsRef<str>) -> Self {
        CanvassError::Validation(format!("malformed {} payload: {}", event, details.as_ref()))
    }

    /// Stale references are expected under replay and never reach the user
    pub fn is_silent(&self) -> bool {
        matches!(self, CanvassError::StaleReference(_))
    }

    /// Whether the error should be shown to the initiating user
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            CanvassError::Validation(_) | CanvassError::MalformedEnvelope(_) | CanvassError::UnknownEvent(_)
        )
    }
}

/// Errors from the broadcast transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Participant {0} is not connected")]
    Disconnected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message() {
        let err = CanvassError::malformed("prompt", "A request ID must be provided");
        let msg = err.to_string();
        assert!(msg.contains("prompt"));
        assert!(msg.contains("request ID"));
        assert!(err.is_user_visible());
    }

    #[test]
    fn test_stale_reference_is_silent() {
        let err = CanvassError::StaleReference("q-1".to_string());
        assert!(err.is_silent());
        assert!(!err.is_user_visible());

        assert!(!CanvassError::UnknownEvent("bogus".to_string()).is_silent());
    }

    #[test]
    fn test_transport_error_converts() {
        let err: CanvassError = TransportError::Disconnected("alice".to_string()).into();
        assert!(err.to_string().contains("alice"));
        assert!(!err.is_user_visible());
    }
}
