//! # Bridges
//!
//! A `Bridge` is the handle to one named channel on a node. Its role comes
//! from the node, and the role-specific operations live on two views:
//!
//! - [`PeerBridge`]: `fire` and `invoke_server_async`, always toward the
//!   coordinator.
//! - [`CoordinatorBridge`]: targeted, broadcast and range sends, plus the
//!   invoke handler.
//!
//! Handles stay valid after `destroy`; every later operation reports
//! `ChannelDestroyed`.

use crate::domain::{
    BridgeError, BridgeResult, ChannelId, ListenerId, MiddlewareChain, PacketKind, Payload,
    PeerId, Position, ReplicationRate, Role, Target,
};
use crate::service::{Node, WeakNode};
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Handle to one named channel.
#[derive(Clone)]
pub struct Bridge {
    node: Node,
    id: ChannelId,
    name: Arc<str>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("role", &self.node.role())
            .finish()
    }
}

impl Bridge {
    pub(crate) fn new(node: Node, id: ChannelId, name: &str) -> Self {
        Self {
            node,
            id,
            name: Arc::from(name),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.node.role()
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Rate currently in effect. A staged change shows after the next tick.
    pub fn replication_rate(&self) -> BridgeResult<ReplicationRate> {
        self.node.with_channel(self.id, &self.name, |entry| entry.rate)
    }

    /// Stage a new rate; it takes effect at the next tick boundary.
    pub fn set_replication_rate(&self, rate: ReplicationRate) -> BridgeResult<()> {
        self.node
            .with_channel(self.id, &self.name, |entry| entry.staged_rate = Some(rate))
    }

    pub fn allows_nil(&self) -> BridgeResult<bool> {
        self.node.with_channel(self.id, &self.name, |entry| entry.allows_nil)
    }

    pub fn set_nil_allowed(&self, allowed: bool) -> BridgeResult<()> {
        self.node
            .with_channel(self.id, &self.name, |entry| entry.allows_nil = allowed)
    }

    /// Replace the inbound chain. Packets already dispatching keep the old one.
    pub fn set_inbound_middleware(&self, chain: MiddlewareChain) -> BridgeResult<()> {
        self.node.set_middleware(self.id, &self.name, Some(chain), None)
    }

    pub fn set_outbound_middleware(&self, chain: MiddlewareChain) -> BridgeResult<()> {
        self.node.set_middleware(self.id, &self.name, None, Some(chain))
    }

    /// Register a listener for every inbound fire on this bridge.
    pub fn connect<F>(&self, listener: F) -> BridgeResult<Connection>
    where
        F: Fn(PeerId, &[Value]) + Send + Sync + 'static,
    {
        self.node
            .add_listener(self.id, &self.name, Arc::new(listener), false)
    }

    /// Like [`Bridge::connect`], disconnected after its first call.
    pub fn once<F>(&self, listener: F) -> BridgeResult<Connection>
    where
        F: Fn(PeerId, &[Value]) + Send + Sync + 'static,
    {
        self.node
            .add_listener(self.id, &self.name, Arc::new(listener), true)
    }

    /// Destroy the channel, its listeners and anything still queued on it.
    ///
    /// # Errors
    ///
    /// `BridgeError::AlreadyDestroyed` on a second call.
    pub fn destroy(&self) -> BridgeResult<()> {
        self.node.destroy_channel(self.id, &self.name)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        !self.node.is_live(self.id)
    }

    /// The role-specific view of this bridge.
    #[must_use]
    pub fn view(self) -> RoleView {
        match self.node.role() {
            Role::Coordinator => RoleView::Coordinator(CoordinatorBridge(self)),
            Role::Peer => RoleView::Peer(PeerBridge(self)),
        }
    }

    /// # Errors
    ///
    /// `BridgeError::WrongRole` on a coordinator node.
    pub fn into_peer(self) -> BridgeResult<PeerBridge> {
        match self.view() {
            RoleView::Peer(bridge) => Ok(bridge),
            RoleView::Coordinator(bridge) => Err(BridgeError::WrongRole {
                channel: bridge.name().to_string(),
                expected: Role::Peer,
            }),
        }
    }

    /// # Errors
    ///
    /// `BridgeError::WrongRole` on a peer node.
    pub fn into_coordinator(self) -> BridgeResult<CoordinatorBridge> {
        match self.view() {
            RoleView::Coordinator(bridge) => Ok(bridge),
            RoleView::Peer(bridge) => Err(BridgeError::WrongRole {
                channel: bridge.name().to_string(),
                expected: Role::Coordinator,
            }),
        }
    }

    fn enqueue(&self, args: Payload, target: Target) -> BridgeResult<()> {
        self.node
            .enqueue(self.id, &self.name, args, target, PacketKind::Fire, None)
    }

    fn prepare(&self, args: Payload) -> BridgeResult<Payload> {
        self.node.prepare_outbound(self.id, &self.name, args)
    }

    fn push(&self, payload: Payload, target: Target) -> BridgeResult<()> {
        self.node
            .push_outbound(self.id, &self.name, payload, target, PacketKind::Fire, None)
    }
}

/// A bridge seen through its node's role.
#[derive(Debug, Clone)]
pub enum RoleView {
    Coordinator(CoordinatorBridge),
    Peer(PeerBridge),
}

/// Peer-side operations.
#[derive(Debug, Clone)]
pub struct PeerBridge(Bridge);

impl Deref for PeerBridge {
    type Target = Bridge;

    fn deref(&self) -> &Bridge {
        &self.0
    }
}

impl PeerBridge {
    fn coordinator(&self) -> BridgeResult<PeerId> {
        self.node.coordinator().ok_or_else(|| BridgeError::WrongRole {
            channel: self.name.to_string(),
            expected: Role::Peer,
        })
    }

    /// Queue a fire toward the coordinator.
    pub fn fire(&self, args: Payload) -> BridgeResult<()> {
        let coordinator = self.coordinator()?;
        self.enqueue(args, Target::Peer(coordinator))
    }

    /// Invoke the coordinator's handler and wait for its reply.
    ///
    /// `timeout` defaults to the node's `invoke_timeout_ms`.
    ///
    /// # Errors
    ///
    /// `BridgeError::InvokeTimeout` if no reply arrives in time; a reply
    /// arriving later is ignored.
    pub async fn invoke_server_async(
        &self,
        args: Payload,
        timeout: Option<Duration>,
    ) -> BridgeResult<Payload> {
        self.node.invoke(self.id, &self.name, args, timeout).await
    }
}

/// Coordinator-side operations.
#[derive(Debug, Clone)]
pub struct CoordinatorBridge(Bridge);

impl Deref for CoordinatorBridge {
    type Target = Bridge;

    fn deref(&self) -> &Bridge {
        &self.0
    }
}

impl CoordinatorBridge {
    fn ensure_known(&self, peer: PeerId) -> BridgeResult<()> {
        if self.node.is_known_peer(peer) {
            Ok(())
        } else {
            Err(BridgeError::UnknownPeer(peer))
        }
    }

    pub fn fire_to(&self, peer: PeerId, args: Payload) -> BridgeResult<()> {
        let payload = self.prepare(args)?;
        self.ensure_known(peer)?;
        self.push(payload, Target::Peer(peer))
    }

    /// One packet per listed peer, duplicates collapsed.
    pub fn fire_to_multiple(&self, peers: &[PeerId], args: Payload) -> BridgeResult<()> {
        let payload = self.prepare(args)?;
        for peer in peers {
            self.ensure_known(*peer)?;
        }
        self.push(payload, Target::Peers(peers.to_vec()))
    }

    /// Every peer known when the packet is flushed.
    pub fn fire_all(&self, args: Payload) -> BridgeResult<()> {
        self.enqueue(args, Target::All)
    }

    /// Every known peer not in `except`. Returns the peers targeted as of now.
    pub fn fire_to_all_except(&self, except: &[PeerId], args: Payload) -> BridgeResult<Vec<PeerId>> {
        let targeted: Vec<PeerId> = self
            .node
            .peers()
            .into_iter()
            .filter(|peer| !except.contains(peer))
            .collect();
        self.enqueue(args, Target::AllExcept(except.to_vec()))?;
        Ok(targeted)
    }

    /// Every known peer the selector places within `radius` of `point`.
    ///
    /// # Errors
    ///
    /// `BridgeError::SelectorUnavailable` if the node has no selector.
    pub fn fire_all_in_range(
        &self,
        point: Position,
        radius: f64,
        args: Payload,
    ) -> BridgeResult<Vec<PeerId>> {
        self.fire_all_in_range_except(&[], point, radius, args)
    }

    pub fn fire_all_in_range_except(
        &self,
        except: &[PeerId],
        point: Position,
        radius: f64,
        args: Payload,
    ) -> BridgeResult<Vec<PeerId>> {
        let payload = self.prepare(args)?;
        let targeted: Vec<PeerId> = self
            .node
            .peers_in_range(point, radius)?
            .into_iter()
            .filter(|peer| !except.contains(peer))
            .collect();
        if targeted.is_empty() {
            debug!(channel = %self.name, radius, "No peers in range");
            return Ok(targeted);
        }
        self.push(payload, Target::Peers(targeted.clone()))?;
        Ok(targeted)
    }

    /// Set the handler answering peer invokes. Replaces any previous one.
    pub fn on_invoke<F>(&self, handler: F) -> BridgeResult<()>
    where
        F: Fn(PeerId, &[Value]) -> Payload + Send + Sync + 'static,
    {
        self.node
            .set_invoke_handler(self.id, &self.name, Arc::new(handler))
    }
}

/// A listener registration. Dropping it does not disconnect.
pub struct Connection {
    node: WeakNode,
    channel: ChannelId,
    listener: ListenerId,
}

impl Connection {
    pub(crate) fn new(node: WeakNode, channel: ChannelId, listener: ListenerId) -> Self {
        Self {
            node,
            channel,
            listener,
        }
    }

    /// Remove the listener. Idempotent; returns true only the first time.
    pub fn disconnect(&self) -> bool {
        self.node
            .upgrade()
            .is_some_and(|node| node.remove_listener(self.channel, self.listener))
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.node
            .upgrade()
            .is_some_and(|node| node.has_listener(self.channel, self.listener))
    }
}
