//! Domain layer: configuration, errors, packets, middleware, channel
//! registry, queues and the invoke correlator.
//!
//! Nothing here touches the transport or spawns tasks; the `Node` service
//! drives these types.

pub mod config;
pub mod error;
pub mod middleware;
pub mod packet;
pub mod pending;
pub mod queue;
pub mod registry;
pub mod tree;
pub mod types;

pub use config::{BridgeConfig, NodeConfig, ReplicationRate};
pub use error::{BridgeError, BridgeResult, ConfigError, MiddlewareError};
pub use middleware::{middleware, Middleware, MiddlewareChain, StageFailure};
pub use packet::{
    Declaration, Frame, InboundPacket, OutboundPacket, PacketKind, Payload, Target, WirePacket,
};
pub use pending::{InvokeStats, PendingInvokes};
pub use queue::{fan_out, InboundQueue, OutboundQueue, QueueSnapshot};
pub use registry::{ChannelRegistry, DispatchTarget, InvokeHandler, Listener, ListenerId};
pub use tree::BridgeTree;
pub use types::{ChannelId, PeerId, Position, Role};
