//! In-process network for tests and single-binary setups.
//!
//! Every frame goes through `Frame::encode`/`Frame::decode` on the way, so
//! the wire format is exercised exactly as a socket transport would. Delivery
//! is synchronous: `send` returns after the receiver has dispatched.

use crate::domain::{ConfigError, Frame, PeerId};
use crate::ports::{FrameReceiver, Transport, TransportError};
use crate::service::{Node, NodeBuilder};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
struct NetworkState {
    receivers: HashMap<PeerId, Arc<dyn FrameReceiver>>,
    /// Destinations whose inbound frames are silently lost.
    dropping: HashSet<PeerId>,
    frames: HashMap<PeerId, u64>,
    packets: HashMap<PeerId, u64>,
    dropped: u64,
}

/// Shared switchboard connecting every attached node.
#[derive(Default)]
pub struct MemoryNetwork {
    state: Mutex<NetworkState>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryNetwork")
            .field("receivers", &state.receivers.len())
            .field("dropping", &state.dropping)
            .field("dropped", &state.dropped)
            .finish()
    }
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Route frames addressed to `peer` into `receiver`.
    pub fn attach(&self, peer: PeerId, receiver: Arc<dyn FrameReceiver>) {
        self.state.lock().receivers.insert(peer, receiver);
    }

    /// Stop routing to `peer`; later sends to it fail as unreachable.
    pub fn detach(&self, peer: PeerId) -> bool {
        self.state.lock().receivers.remove(&peer).is_some()
    }

    /// A transport sending from `local`.
    #[must_use]
    pub fn transport(self: &Arc<Self>, local: PeerId) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            network: Arc::clone(self),
            local,
        })
    }

    /// Build a node on this network and attach it under its own id.
    ///
    /// The network only holds a weak handle; dropping every `Node` detaches
    /// it in effect.
    pub fn join(self: &Arc<Self>, builder: NodeBuilder) -> Result<Node, ConfigError> {
        let id = builder.node_id();
        let node = builder.build(self.transport(id))?;
        self.attach(id, Arc::new(node.downgrade()));
        Ok(node)
    }

    /// Lose every frame sent to `peer` while enabled.
    pub fn set_dropping(&self, peer: PeerId, dropping: bool) {
        let mut state = self.state.lock();
        if dropping {
            state.dropping.insert(peer);
        } else {
            state.dropping.remove(&peer);
        }
    }

    /// Frames delivered to `peer`.
    #[must_use]
    pub fn frames_to(&self, peer: PeerId) -> u64 {
        self.state.lock().frames.get(&peer).copied().unwrap_or(0)
    }

    /// Packets delivered to `peer`, across all frames.
    #[must_use]
    pub fn packets_to(&self, peer: PeerId) -> u64 {
        self.state.lock().packets.get(&peer).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.state.lock().dropped
    }

    fn deliver(
        &self,
        source: PeerId,
        destination: PeerId,
        frame: &Frame,
    ) -> Result<(), TransportError> {
        let bytes = frame
            .encode()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let receiver = {
            let mut state = self.state.lock();
            let receiver = state
                .receivers
                .get(&destination)
                .cloned()
                .ok_or(TransportError::Unreachable(destination))?;
            if state.dropping.contains(&destination) {
                state.dropped += 1;
                trace!(from = %source, to = %destination, "Frame dropped");
                return Ok(());
            }
            *state.frames.entry(destination).or_default() += 1;
            *state.packets.entry(destination).or_default() += frame.packets.len() as u64;
            receiver
        };

        let decoded = Frame::decode(&bytes).map_err(|e| TransportError::Io(e.to_string()))?;
        trace!(from = %source, to = %destination, bytes = bytes.len(), "Frame delivered");
        receiver.on_frame(source, decoded);
        Ok(())
    }
}

/// One node's link into a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    local: PeerId,
}

impl MemoryTransport {
    #[must_use]
    pub fn local(&self) -> PeerId {
        self.local
    }
}

impl Transport for MemoryTransport {
    fn send(&self, destination: PeerId, frame: Frame) -> Result<(), TransportError> {
        self.network.deliver(self.local, destination, &frame)
    }
}
