//! # Bridge Net - Rate-Limited Named-Channel Messaging
//!
//! A coordinator and any number of peers exchange argument lists over named
//! channels ("bridges"). Sends are queued and leave in batches at each
//! bridge's replication rate; a request/reply layer (`invoke`) rides on the
//! same queues.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          NODE                                │
//! │  ┌────────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │  Bridges   │──→│  Middleware   │──→│  OutboundQueue   │   │
//! │  │ (facades)  │   │  (outbound)   │   │  (per channel)   │   │
//! │  └─────┬──────┘   └───────────────┘   └────────┬─────────┘   │
//! │        │ listeners / invoke handler             │ tick        │
//! │  ┌─────┴──────┐   ┌───────────────┐   ┌────────┴─────────┐   │
//! │  │  Dispatch  │←──│  Middleware   │←──│  InboundQueue    │   │
//! │  └────────────┘   │  (inbound)    │   └────────┬─────────┘   │
//! │                   └───────────────┘            │             │
//! └────────────────────────────────────────────────┼─────────────┘
//!                                                  │ Frame
//!                                        Transport (port)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bridge_net::{adapters::MemoryNetwork, BridgeConfig, NodeBuilder, PeerId};
//!
//! let network = MemoryNetwork::new();
//! let server = network.join(NodeBuilder::coordinator(PeerId::new(0)))?;
//! let client = network.join(NodeBuilder::peer(PeerId::new(1), PeerId::new(0)))?;
//! server.add_peer(PeerId::new(1));
//!
//! let chat = server.create_bridge("Chat", BridgeConfig::new())?;
//! chat.connect(|from, args| println!("{from}: {args:?}"))?;
//!
//! let chat = client.create_bridge("Chat", BridgeConfig::new())?.into_peer()?;
//! chat.fire(vec!["hello".into()])?;
//! client.spawn_scheduler();
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod bridge;
pub mod domain;
pub mod ports;
pub mod service;

pub use bridge::{Bridge, Connection, CoordinatorBridge, PeerBridge, RoleView};
pub use domain::{
    middleware, BridgeConfig, BridgeError, BridgeResult, BridgeTree, ConfigError, Frame,
    MiddlewareChain, MiddlewareError, NodeConfig, PacketKind, Payload, PeerId, Position,
    QueueSnapshot, ReplicationRate, Role,
};
pub use ports::{FrameReceiver, PeerSelector, Transport, TransportError};
pub use service::{ErrorHandler, Node, NodeBuilder, TickReport, WeakNode};
pub use shared_serdes::Token;
