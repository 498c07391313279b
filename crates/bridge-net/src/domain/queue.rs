//! # Send / Receive Queues
//!
//! The outbound queue is partitioned per channel. A flush takes a channel's
//! whole partition at once, so packets of one channel leave in enqueue order
//! and are removed as one batch.

use crate::domain::packet::{InboundPacket, OutboundPacket};
use crate::domain::types::{ChannelId, PeerId};
use std::collections::{BTreeMap, VecDeque};

/// Pending outbound packets, per channel.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    partitions: BTreeMap<ChannelId, VecDeque<OutboundPacket>>,
}

impl OutboundQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: OutboundPacket) {
        self.partitions
            .entry(packet.channel)
            .or_default()
            .push_back(packet);
    }

    /// Remove and return the channel's whole partition, FIFO.
    pub fn take(&mut self, channel: ChannelId) -> Vec<OutboundPacket> {
        self.partitions
            .remove(&channel)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drop a channel's partition without sending; returns how many packets.
    pub fn discard(&mut self, channel: ChannelId) -> usize {
        self.partitions.remove(&channel).map_or(0, |q| q.len())
    }

    #[must_use]
    pub fn len_for(&self, channel: ChannelId) -> usize {
        self.partitions.get(&channel).map_or(0, VecDeque::len)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.values().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.values().all(VecDeque::is_empty)
    }

    /// Copy of every pending packet, grouped by channel.
    #[must_use]
    pub fn snapshot(&self) -> Vec<OutboundPacket> {
        self.partitions.values().flatten().cloned().collect()
    }
}

/// Received packets awaiting dispatch.
#[derive(Debug, Default)]
pub struct InboundQueue {
    packets: VecDeque<InboundPacket>,
}

impl InboundQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: InboundPacket) {
        self.packets.push_back(packet);
    }

    pub fn pop(&mut self) -> Option<InboundPacket> {
        self.packets.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<InboundPacket> {
        self.packets.iter().cloned().collect()
    }
}

/// Split flushed packets into per-destination batches.
///
/// Each destination sees packets in the order given; fan-out targets
/// duplicate a packet into every resolved destination.
#[must_use]
pub fn fan_out(
    packets: Vec<OutboundPacket>,
    known_peers: &[PeerId],
) -> BTreeMap<PeerId, Vec<OutboundPacket>> {
    let mut batches: BTreeMap<PeerId, Vec<OutboundPacket>> = BTreeMap::new();
    for packet in packets {
        let destinations = packet.target.resolve(known_peers);
        if let Some((last, rest)) = destinations.split_last() {
            for peer in rest {
                batches.entry(*peer).or_default().push(packet.clone());
            }
            batches.entry(*last).or_default().push(packet);
        }
    }
    batches
}

/// Snapshot of both queues.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub outbound: Vec<OutboundPacket>,
    pub inbound: Vec<InboundPacket>,
}
