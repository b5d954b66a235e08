//! Error types for broker operations
//!
//! Every error is surfaced to the immediate caller through the channel API:
//! as the `Err` side of a reply callback, of an awaited request, or of
//! `listen`. Nothing is reported through the dispatcher itself.

use std::time::Duration;
use thiserror::Error;

/// Broker error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// A request was made on a channel with no active responder
    #[error("Missing listener for request")]
    MissingListener,

    /// A second responder tried to register on a request channel
    #[error("Listener already exists")]
    ListenerAlreadyExists,

    /// The responder dropped its reply handle without answering
    #[error("Responder dropped the reply without sending a value")]
    ReplyDropped,

    /// No reply arrived within the allotted time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The pending reply was discarded before a result was produced
    #[error("Request canceled")]
    Canceled,

    /// The process-wide broker was initialized twice
    #[error("Broker already initialized")]
    AlreadyInitialized,
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl BrokerError {
    /// Check if this error signals a programming mistake rather than a
    /// runtime condition the caller is expected to handle.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            BrokerError::ListenerAlreadyExists | BrokerError::AlreadyInitialized
        )
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            BrokerError::MissingListener => "MISSING_LISTENER",
            BrokerError::ListenerAlreadyExists => "LISTENER_ALREADY_EXISTS",
            BrokerError::ReplyDropped => "REPLY_DROPPED",
            BrokerError::Timeout(_) => "TIMEOUT",
            BrokerError::Canceled => "CANCELED",
            BrokerError::AlreadyInitialized => "ALREADY_INITIALIZED",
        }
    }
}
