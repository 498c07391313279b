//! Error types for bridges, nodes and configuration.

use crate::domain::types::{PeerId, Role};
use crate::ports::outbound::TransportError;
use shared_serdes::SerdesError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by bridge and node operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Bridge '{0}' already exists")]
    DuplicateChannel(String),

    #[error("Identifier '{0}' already exists")]
    DuplicateIdentifier(String),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Malformed UUID: {0}")]
    MalformedUuid(String),

    #[error("Bridge '{channel}' does not allow nil (argument {index})")]
    NilNotAllowed { channel: String, index: usize },

    #[error("Bridge '{0}' has been destroyed")]
    ChannelDestroyed(String),

    #[error("Bridge '{0}' was already destroyed")]
    AlreadyDestroyed(String),

    #[error("Invoke on '{channel}' timed out after {timeout_ms}ms")]
    InvokeTimeout { channel: String, timeout_ms: u64 },

    #[error("Correlation id {0} is already in use")]
    CorrelationCollision(Uuid),

    #[error("Middleware stage {stage} on '{channel}' failed: {reason}")]
    MiddlewareFailure {
        channel: String,
        stage: usize,
        reason: String,
    },

    #[error("Bridge '{channel}' is not a {expected} bridge")]
    WrongRole { channel: String, expected: Role },

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    #[error("No peer selector configured for range queries")]
    SelectorUnavailable,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Node closed")]
    Closed,
}

impl From<SerdesError> for BridgeError {
    fn from(e: SerdesError) -> Self {
        match e {
            SerdesError::DuplicateIdentifier(name) => Self::DuplicateIdentifier(name),
            SerdesError::UnknownIdentifier(name) => Self::UnknownIdentifier(name),
            SerdesError::MalformedUuid { input, reason } => {
                Self::MalformedUuid(format!("{input}: {reason}"))
            }
        }
    }
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Stage-level failure raised by a middleware transform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MiddlewareError(pub String);

impl MiddlewareError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Invalid node or bridge configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),
}
