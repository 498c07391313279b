//! Ports: the seams to the transport and to external peer selection.

pub mod inbound;
pub mod outbound;

pub use inbound::FrameReceiver;
pub use outbound::{PeerSelector, Transport, TransportError};
