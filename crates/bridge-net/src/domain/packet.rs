//! # Packets and Frames
//!
//! `OutboundPacket` / `InboundPacket` are the queued, node-local forms.
//! `Frame` is the batch handed to the transport: one per destination per
//! tick.
//!
//! ## Wire Layout
//!
//! ```text
//! Frame {
//!   d: [ { t: "C", n: "Combat.Attack" } ],        // each token used below
//!   p: [ { c: "C", a: [..args..], k: "f" },        // fire
//!        { c: "C", a: [..], k: "i", u: "<22 chars>" } ] // invoke
//! }
//! ```
//!
//! A channel name crosses the wire once per frame; every packet in the frame
//! carries only the token.

use crate::domain::types::{ChannelId, PeerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_serdes::Token;
use uuid::Uuid;

/// Ordered argument list. `Value::Null` is nil.
pub type Payload = Vec<Value>;

/// Index of the first nil argument, if any.
#[must_use]
pub fn first_nil(payload: &[Value]) -> Option<usize> {
    payload.iter().position(Value::is_null)
}

/// Who an outbound packet is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// One peer (for peer-role bridges: the coordinator).
    Peer(PeerId),
    /// An explicit set.
    Peers(Vec<PeerId>),
    /// Every peer known at flush time.
    All,
    /// Every peer known at flush time except the set.
    AllExcept(Vec<PeerId>),
}

impl Target {
    /// Resolve to concrete destinations, deduplicated, in first-seen order.
    #[must_use]
    pub fn resolve(&self, known: &[PeerId]) -> Vec<PeerId> {
        let mut out: Vec<PeerId> = Vec::new();
        let mut push = |peer: PeerId| {
            if !out.contains(&peer) {
                out.push(peer);
            }
        };
        match self {
            Self::Peer(peer) => push(*peer),
            Self::Peers(peers) => peers.iter().copied().for_each(push),
            Self::All => known.iter().copied().for_each(push),
            Self::AllExcept(excluded) => known
                .iter()
                .copied()
                .filter(|p| !excluded.contains(p))
                .for_each(push),
        }
        out
    }
}

/// What a packet means to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PacketKind {
    /// Fire-and-forget; delivered to listeners.
    #[default]
    #[serde(rename = "f")]
    Fire,
    /// Request expecting a reply with the same correlation id.
    #[serde(rename = "i")]
    Invoke,
    /// Answer to an invoke.
    #[serde(rename = "r")]
    Reply,
}

/// A packet waiting in a node's outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPacket {
    pub channel: ChannelId,
    pub token: Token,
    pub payload: Payload,
    pub target: Target,
    pub kind: PacketKind,
    pub correlation: Option<Uuid>,
}

impl OutboundPacket {
    pub(crate) fn to_wire(&self) -> WirePacket {
        WirePacket {
            channel: self.token,
            args: self.payload.clone(),
            kind: self.kind,
            correlation: self.correlation.as_ref().map(shared_serdes::pack_uuid),
        }
    }
}

/// A received packet waiting for inbound dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPacket {
    pub source: PeerId,
    pub channel: ChannelId,
    pub payload: Payload,
    pub kind: PacketKind,
    pub correlation: Option<Uuid>,
}

/// Packet as carried inside a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePacket {
    #[serde(rename = "c")]
    pub channel: Token,
    #[serde(rename = "a", default)]
    pub args: Payload,
    #[serde(rename = "k", default)]
    pub kind: PacketKind,
    /// Packed correlation UUID.
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
}

/// Binds a token to a channel name within one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(rename = "t")]
    pub token: Token,
    #[serde(rename = "n")]
    pub name: String,
}

/// The unit handed to the transport.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "d", default, skip_serializing_if = "Vec::is_empty")]
    pub declarations: Vec<Declaration>,
    #[serde(rename = "p", default)]
    pub packets: Vec<WirePacket>,
}

impl Frame {
    /// Serialize for byte-oriented transports.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Inverse of [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures, including bad tokens.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
