//! Error types for a3s-notify

use thiserror::Error;

/// Errors that can occur in the notifier
#[derive(Debug, Error)]
pub enum EventError {
    /// No registry entry exists for the event name
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// At least one subscriber did not accept within the timeout.
    ///
    /// Delivery to every other subscriber has already completed when
    /// this is returned.
    #[error("Post to event '{event}' timed out for {timed_out} subscriber(s) ({delivered} delivered)")]
    PostTimedOut {
        event: String,
        timed_out: usize,
        delivered: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventError {
    /// True for `EventNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, EventError::EventNotFound(_))
    }

    /// True for `PostTimedOut`
    pub fn is_timed_out(&self) -> bool {
        matches!(self, EventError::PostTimedOut { .. })
    }
}

/// Result type alias for notifier operations
pub type Result<T> = std::result::Result<T, EventError>;
