//! Inbound ports (API) offered to transports.

use crate::domain::{Frame, PeerId};

/// Callback a transport invokes for every frame it receives.
///
/// Registered once per node at startup.
pub trait FrameReceiver: Send + Sync {
    fn on_frame(&self, source: PeerId, frame: Frame);
}
