//! Outbound ports (SPI) implemented by adapters.

use crate::domain::{Frame, PeerId, Position};
use thiserror::Error;

/// Transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    Unreachable(PeerId),

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Transport failure: {0}")]
    Io(String),
}

/// Unreliable point-to-point frame delivery.
pub trait Transport: Send + Sync {
    /// Hand one frame to the link toward `destination`.
    ///
    /// `Ok` means accepted, not delivered.
    fn send(&self, destination: PeerId, frame: Frame) -> Result<(), TransportError>;
}

/// External peer selection for range-based sends.
pub trait PeerSelector: Send + Sync {
    /// Peers within `radius` of `point`.
    fn peers_in_range(&self, point: Position, radius: f64) -> Vec<PeerId>;
}
