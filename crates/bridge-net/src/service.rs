//! # Node Service
//!
//! One `Node` per process side. It owns the channel registry, both queues,
//! the known peer set and the pending invoke store.
//!
//! ## Control Flow
//!
//! ```text
//! bridge.fire(args) ──outbound middleware──→ OutboundQueue[channel]
//!                                                   │
//!            tick(elapsed) ── due channels ─────────┘
//!                   │
//!                   ↓ fan_out
//!           Transport::send(peer, Frame)   (one frame per destination)
//!
//! Transport ──on_frame──→ InboundQueue ──inbound middleware──→ listeners
//!                                                         └──→ invoke handler / pending invoke
//! ```
//!
//! ## Concurrency
//!
//! All node state sits behind one mutex, the node's single logical
//! execution context. The lock is never held while user code runs
//! (middleware, listeners, invoke handlers) or while the transport is
//! called, so listeners may fire on bridges freely.

use crate::bridge::{Bridge, Connection};
use crate::domain::{
    fan_out, BridgeConfig, BridgeError, BridgeResult, BridgeTree, ChannelId, ChannelRegistry,
    ConfigError, Declaration, Frame, InboundPacket, InboundQueue, InvokeHandler, InvokeStats,
    Listener, MiddlewareChain, NodeConfig, OutboundPacket, OutboundQueue, PacketKind, Payload,
    PeerId, PendingInvokes, QueueSnapshot, ReplicationRate, Role, Target,
};
use crate::ports::{FrameReceiver, PeerSelector, Transport};
use parking_lot::{Mutex, RwLock};
use shared_serdes::{unpack_uuid, Token};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receives inbound failures (middleware, undeclared tokens, bad ids).
pub type ErrorHandler = Arc<dyn Fn(&BridgeError) + Send + Sync>;

/// Outcome of one scheduler step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Channels that were due and had packets.
    pub channels_flushed: usize,
    /// Frames accepted by the transport.
    pub frames_sent: usize,
    /// Packets across those frames.
    pub packets_sent: usize,
}

struct NodeState {
    config: NodeConfig,
    send_rate: ReplicationRate,
    receive_rate: ReplicationRate,
    registry: ChannelRegistry,
    outbound: OutboundQueue,
    inbound: InboundQueue,
    peers: BTreeSet<PeerId>,
    pending: PendingInvokes,
}

impl NodeState {
    /// Build one self-describing frame: each token it uses is declared once.
    fn frame_for(&self, batch: &[OutboundPacket]) -> Frame {
        let mut declared: HashSet<Token> = HashSet::new();
        let mut declarations = Vec::new();
        for packet in batch {
            let Some(entry) = self.registry.get(packet.channel) else {
                continue;
            };
            if declared.insert(packet.token) {
                declarations.push(Declaration {
                    token: packet.token,
                    name: entry.name.clone(),
                });
            }
        }
        Frame {
            declarations,
            packets: batch.iter().map(OutboundPacket::to_wire).collect(),
        }
    }
}

struct NodeInner {
    id: PeerId,
    role: Role,
    coordinator: Option<PeerId>,
    transport: Arc<dyn Transport>,
    selector: Option<Arc<dyn PeerSelector>>,
    state: Mutex<NodeState>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

/// Builder for a [`Node`]: the start-up entry point.
pub struct NodeBuilder {
    id: PeerId,
    role: Role,
    coordinator: Option<PeerId>,
    config: NodeConfig,
    selector: Option<Arc<dyn PeerSelector>>,
}

impl NodeBuilder {
    /// A coordinator node.
    #[must_use]
    pub fn coordinator(id: PeerId) -> Self {
        Self {
            id,
            role: Role::Coordinator,
            coordinator: None,
            config: NodeConfig::default(),
            selector: None,
        }
    }

    /// A peer node sending to `coordinator`.
    #[must_use]
    pub fn peer(id: PeerId, coordinator: PeerId) -> Self {
        Self {
            id,
            role: Role::Peer,
            coordinator: Some(coordinator),
            config: NodeConfig::default(),
            selector: None,
        }
    }

    #[must_use]
    pub fn node_id(&self) -> PeerId {
        self.id
    }

    #[must_use]
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Peer selection used by range-based sends.
    #[must_use]
    pub fn peer_selector(mut self, selector: Arc<dyn PeerSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Validate the configuration and wire the transport.
    ///
    /// # Errors
    ///
    /// Any `ConfigError` from [`NodeConfig::validate`].
    pub fn build(self, transport: Arc<dyn Transport>) -> Result<Node, ConfigError> {
        self.config.validate()?;
        let send_rate = ReplicationRate::per_second(self.config.send_rate)?;
        let receive_rate = ReplicationRate::per_second(self.config.receive_rate)?;

        let mut peers = BTreeSet::new();
        if let Some(coordinator) = self.coordinator {
            peers.insert(coordinator);
        }

        info!(node = %self.id, role = %self.role, send_rate = send_rate.hz(), "Node started");

        Ok(Node {
            inner: Arc::new(NodeInner {
                id: self.id,
                role: self.role,
                coordinator: self.coordinator,
                transport,
                selector: self.selector,
                state: Mutex::new(NodeState {
                    pending: PendingInvokes::new(self.config.retired_correlation_capacity),
                    config: self.config,
                    send_rate,
                    receive_rate,
                    registry: ChannelRegistry::new(),
                    outbound: OutboundQueue::new(),
                    inbound: InboundQueue::new(),
                    peers,
                }),
                error_handler: RwLock::new(None),
            }),
        })
    }
}

/// Handle to a node. Clones share state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Non-owning node handle, for transports and connections.
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

impl WeakNode {
    #[must_use]
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl Node {
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// The coordinator a peer node sends to.
    #[must_use]
    pub fn coordinator(&self) -> Option<PeerId> {
        self.inner.coordinator
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn config(&self) -> NodeConfig {
        self.inner.state.lock().config.clone()
    }

    // =========================================================================
    // RATES
    // =========================================================================

    /// Default replication rate (Hz) for new bridges.
    #[must_use]
    pub fn send_rate(&self) -> u32 {
        self.inner.state.lock().send_rate.hz()
    }

    /// Change the default for bridges created from now on.
    pub fn set_send_rate(&self, hz: u32) -> Result<(), ConfigError> {
        let rate = ReplicationRate::per_second(hz)?;
        let mut state = self.inner.state.lock();
        state.send_rate = rate;
        state.config.send_rate = hz;
        Ok(())
    }

    #[must_use]
    pub fn receive_rate(&self) -> u32 {
        self.inner.state.lock().receive_rate.hz()
    }

    pub fn set_receive_rate(&self, hz: u32) -> Result<(), ConfigError> {
        let rate = ReplicationRate::per_second(hz)?;
        let mut state = self.inner.state.lock();
        state.receive_rate = rate;
        state.config.receive_rate = hz;
        Ok(())
    }

    // =========================================================================
    // IDENTIFIERS
    // =========================================================================

    pub fn create_identifier(&self, name: &str) -> BridgeResult<Token> {
        let mut state = self.inner.state.lock();
        Ok(state.registry.identifiers_mut().create_identifier(name)?)
    }

    pub fn destroy_identifier(&self, name: &str) -> BridgeResult<()> {
        let mut state = self.inner.state.lock();
        Ok(state.registry.identifiers_mut().destroy_identifier(name)?)
    }

    /// Intern several names at once; all or nothing.
    pub fn create_identifiers<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> BridgeResult<BTreeMap<String, Token>> {
        let mut state = self.inner.state.lock();
        Ok(state.registry.identifiers_mut().create_identifiers(names)?)
    }

    #[must_use]
    pub fn identifier(&self, name: &str) -> Option<Token> {
        self.inner.state.lock().registry.identifiers().token_of(name)
    }

    // =========================================================================
    // BRIDGES
    // =========================================================================

    /// Register a bridge under a globally unique name.
    pub fn create_bridge(&self, name: &str, config: BridgeConfig) -> BridgeResult<Bridge> {
        let id = {
            let mut state = self.inner.state.lock();
            let default_rate = state.send_rate;
            state
                .registry
                .register(name, self.inner.role, default_rate, config)?
        };
        Ok(Bridge::new(self.clone(), id, name))
    }

    /// Suspend until a bridge named `name` exists on this node.
    ///
    /// Never times out; wrap in `tokio::time::timeout` to bound it.
    pub async fn wait_for_bridge(&self, name: &str) -> BridgeResult<Bridge> {
        let outcome = self.inner.state.lock().registry.wait(name);
        let id = match outcome {
            crate::domain::registry::WaitOutcome::Ready(id) => id,
            crate::domain::registry::WaitOutcome::Pending(rx) => {
                rx.await.map_err(|_| BridgeError::Closed)?
            }
        };
        Ok(Bridge::new(self.clone(), id, name))
    }

    /// Create every bridge of a tree under its dotted name.
    ///
    /// On failure the bridges created by this call are destroyed again.
    pub fn create_bridge_tree(&self, tree: &BridgeTree) -> BridgeResult<BTreeMap<String, Bridge>> {
        let mut created: BTreeMap<String, Bridge> = BTreeMap::new();
        for (name, config) in tree.flatten() {
            match self.create_bridge(&name, config) {
                Ok(bridge) => {
                    created.insert(name, bridge);
                }
                Err(e) => {
                    for bridge in created.values() {
                        let _ = bridge.destroy();
                    }
                    return Err(e);
                }
            }
        }
        Ok(created)
    }

    #[must_use]
    pub fn bridge_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    // =========================================================================
    // PEERS
    // =========================================================================

    /// Track a peer for broadcast resolution. Returns false if known.
    pub fn add_peer(&self, peer: PeerId) -> bool {
        let added = self.inner.state.lock().peers.insert(peer);
        if added {
            debug!(node = %self.inner.id, peer = %peer, "Peer added");
        }
        added
    }

    /// Forget a peer. Packets already queued for it are still resolved
    /// against the peer set at flush time.
    pub fn remove_peer(&self, peer: PeerId) -> bool {
        let removed = self.inner.state.lock().peers.remove(&peer);
        if removed {
            debug!(node = %self.inner.id, peer = %peer, "Peer removed");
        }
        removed
    }

    #[must_use]
    pub fn peers(&self) -> Vec<PeerId> {
        self.inner.state.lock().peers.iter().copied().collect()
    }

    #[must_use]
    pub fn is_known_peer(&self, peer: PeerId) -> bool {
        self.inner.state.lock().peers.contains(&peer)
    }

    pub(crate) fn peers_in_range(
        &self,
        point: crate::domain::Position,
        radius: f64,
    ) -> BridgeResult<Vec<PeerId>> {
        let selector = self
            .inner
            .selector
            .as_ref()
            .ok_or(BridgeError::SelectorUnavailable)?;
        let candidates = selector.peers_in_range(point, radius);
        let state = self.inner.state.lock();
        let mut out: Vec<PeerId> = Vec::new();
        for peer in candidates {
            if state.peers.contains(&peer) && !out.contains(&peer) {
                out.push(peer);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // ERRORS / INSPECTION
    // =========================================================================

    /// Register the handler inbound failures are surfaced to.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&BridgeError) + Send + Sync + 'static,
    {
        *self.inner.error_handler.write() = Some(Arc::new(handler));
    }

    fn report(&self, error: &BridgeError) {
        let handler = self.inner.error_handler.read().clone();
        match handler {
            Some(handler) => handler(error),
            None => warn!(node = %self.inner.id, error = %error, "Bridge error"),
        }
    }

    /// Copies of everything currently queued.
    #[must_use]
    pub fn queue_snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock();
        QueueSnapshot {
            outbound: state.outbound.snapshot(),
            inbound: state.inbound.snapshot(),
        }
    }

    #[must_use]
    pub fn pending_invokes(&self) -> usize {
        self.inner.state.lock().pending.pending_count()
    }

    #[must_use]
    pub fn invoke_stats(&self) -> InvokeStats {
        self.inner.state.lock().pending.stats()
    }

    // =========================================================================
    // CHANNEL OPERATIONS (used by the bridge facades)
    // =========================================================================

    pub(crate) fn is_live(&self, channel: ChannelId) -> bool {
        self.inner.state.lock().registry.get(channel).is_some()
    }

    pub(crate) fn with_channel<T>(
        &self,
        channel: ChannelId,
        name: &str,
        f: impl FnOnce(&mut crate::domain::registry::ChannelEntry) -> T,
    ) -> BridgeResult<T> {
        let mut state = self.inner.state.lock();
        let entry = state
            .registry
            .get_mut(channel)
            .ok_or_else(|| BridgeError::ChannelDestroyed(name.to_string()))?;
        Ok(f(entry))
    }

    pub(crate) fn add_listener(
        &self,
        channel: ChannelId,
        name: &str,
        listener: Listener,
        once: bool,
    ) -> BridgeResult<Connection> {
        let listener_id = self
            .inner
            .state
            .lock()
            .registry
            .add_listener(channel, listener, once)
            .ok_or_else(|| BridgeError::ChannelDestroyed(name.to_string()))?;
        Ok(Connection::new(self.downgrade(), channel, listener_id))
    }

    pub(crate) fn remove_listener(
        &self,
        channel: ChannelId,
        listener: crate::domain::ListenerId,
    ) -> bool {
        self.inner
            .state
            .lock()
            .registry
            .get_mut(channel)
            .is_some_and(|entry| entry.remove_listener(listener))
    }

    pub(crate) fn has_listener(
        &self,
        channel: ChannelId,
        listener: crate::domain::ListenerId,
    ) -> bool {
        self.inner
            .state
            .lock()
            .registry
            .get(channel)
            .is_some_and(|entry| entry.has_listener(listener))
    }

    pub(crate) fn set_invoke_handler(
        &self,
        channel: ChannelId,
        name: &str,
        handler: InvokeHandler,
    ) -> BridgeResult<()> {
        self.with_channel(channel, name, |entry| entry.invoke_handler = Some(handler))
    }

    pub(crate) fn set_middleware(
        &self,
        channel: ChannelId,
        name: &str,
        inbound: Option<MiddlewareChain>,
        outbound: Option<MiddlewareChain>,
    ) -> BridgeResult<()> {
        self.with_channel(channel, name, |entry| {
            if let Some(chain) = inbound {
                entry.inbound = chain;
            }
            if let Some(chain) = outbound {
                entry.outbound = chain;
            }
        })
    }

    /// Destroy a channel: listeners go with it, queued packets are dropped.
    pub(crate) fn destroy_channel(&self, channel: ChannelId, name: &str) -> BridgeResult<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.registry.remove(channel).is_none() {
            return Err(BridgeError::AlreadyDestroyed(name.to_string()));
        }
        let dropped = state.outbound.discard(channel);
        if dropped > 0 {
            debug!(channel = name, dropped, "Discarded queued packets of destroyed bridge");
        }
        Ok(())
    }

    /// Run outbound middleware and queue one packet.
    pub(crate) fn enqueue(
        &self,
        channel: ChannelId,
        name: &str,
        payload: Payload,
        target: Target,
        kind: PacketKind,
        correlation: Option<Uuid>,
    ) -> BridgeResult<()> {
        let payload = self.prepare_outbound(channel, name, payload)?;
        self.push_outbound(channel, name, payload, target, kind, correlation)
    }

    /// Liveness and nil checks, then the outbound chain. Nothing is queued.
    pub(crate) fn prepare_outbound(
        &self,
        channel: ChannelId,
        name: &str,
        payload: Payload,
    ) -> BridgeResult<Payload> {
        let chain = self.with_channel(channel, name, |entry| {
            if !entry.allows_nil {
                if let Some(index) = crate::domain::packet::first_nil(&payload) {
                    return Err(BridgeError::NilNotAllowed {
                        channel: name.to_string(),
                        index,
                    });
                }
            }
            Ok(entry.outbound.clone())
        })??;

        chain
            .apply(payload)
            .map_err(|failure| BridgeError::MiddlewareFailure {
                channel: name.to_string(),
                stage: failure.stage,
                reason: failure.error.to_string(),
            })
    }

    /// Queue an already transformed payload.
    pub(crate) fn push_outbound(
        &self,
        channel: ChannelId,
        name: &str,
        payload: Payload,
        target: Target,
        kind: PacketKind,
        correlation: Option<Uuid>,
    ) -> BridgeResult<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let token = state
            .registry
            .get(channel)
            .map(|entry| entry.token)
            .ok_or_else(|| BridgeError::ChannelDestroyed(name.to_string()))?;
        state.outbound.push(OutboundPacket {
            channel,
            token,
            payload,
            target,
            kind,
            correlation,
        });
        Ok(())
    }

    /// Send an invoke and suspend until the reply or the timeout.
    pub(crate) async fn invoke(
        &self,
        channel: ChannelId,
        name: &str,
        args: Payload,
        timeout: Option<Duration>,
    ) -> BridgeResult<Payload> {
        let coordinator = self.inner.coordinator.ok_or_else(|| BridgeError::WrongRole {
            channel: name.to_string(),
            expected: Role::Peer,
        })?;
        let timeout = timeout.unwrap_or_else(|| self.inner.state.lock().config.invoke_timeout());

        let id = shared_serdes::create_uuid();
        let reply = self.inner.state.lock().pending.register(id, name)?;

        if let Err(e) = self.enqueue(
            channel,
            name,
            args,
            Target::Peer(coordinator),
            PacketKind::Invoke,
            Some(id),
        ) {
            self.inner.state.lock().pending.cancel(id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.inner.state.lock().pending.expire(id);
                Err(BridgeError::InvokeTimeout {
                    channel: name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    // =========================================================================
    // SCHEDULER
    // =========================================================================

    /// Smallest replication interval across bridges.
    #[must_use]
    pub fn base_interval(&self) -> Duration {
        let state = self.inner.state.lock();
        state.registry.base_interval(state.send_rate.interval())
    }

    /// Advance the scheduler by `elapsed` and flush every due channel.
    ///
    /// A channel is due once `elapsed` has accumulated to its interval; its
    /// whole queue leaves as one batch, at most once per tick.
    pub fn tick(&self, elapsed: Duration) -> TickReport {
        let mut report = TickReport::default();

        let (frames, log_sends) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let mut flushed = Vec::new();
            for id in state.registry.ids() {
                let Some(entry) = state.registry.get_mut(id) else {
                    continue;
                };
                entry.apply_staged_rate();
                entry.since_flush += elapsed;
                if entry.since_flush < entry.rate.interval() {
                    continue;
                }
                entry.since_flush = Duration::ZERO;

                let batch = state.outbound.take(id);
                if !batch.is_empty() {
                    report.channels_flushed += 1;
                    flushed.extend(batch);
                }
            }

            if flushed.is_empty() {
                return report;
            }

            let peers: Vec<PeerId> = state.peers.iter().copied().collect();
            let frames: Vec<(PeerId, Frame)> = fan_out(flushed, &peers)
                .into_iter()
                .map(|(destination, batch)| (destination, state.frame_for(&batch)))
                .collect();
            (frames, state.config.log_sends)
        };

        for (destination, frame) in frames {
            let packets = frame.packets.len();
            if log_sends {
                info!(node = %self.inner.id, peer = %destination, packets, "Sending frame");
            } else {
                debug!(node = %self.inner.id, peer = %destination, packets, "Sending frame");
            }
            match self.inner.transport.send(destination, frame) {
                Ok(()) => {
                    report.frames_sent += 1;
                    report.packets_sent += packets;
                }
                Err(e) => self.report(&e.into()),
            }
        }
        report
    }

    /// Spawn the tick loop on the current tokio runtime.
    ///
    /// The interval is recomputed every iteration. The task ends once every
    /// strong `Node` handle is gone; abort the handle to stop it earlier.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let weak = self.downgrade();
        tokio::spawn(scheduler_loop(weak))
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Accept a frame from `source` and dispatch it immediately.
    pub fn receive_frame(&self, source: PeerId, frame: Frame) {
        let mut errors = Vec::new();
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            if state.config.log_receives {
                info!(node = %self.inner.id, peer = %source, packets = frame.packets.len(), "Received frame");
            } else {
                debug!(node = %self.inner.id, peer = %source, packets = frame.packets.len(), "Received frame");
            }

            let names: HashMap<Token, String> = frame
                .declarations
                .into_iter()
                .map(|declaration| (declaration.token, declaration.name))
                .collect();

            for wire in frame.packets {
                let Some(name) = names.get(&wire.channel) else {
                    errors.push(BridgeError::UnknownIdentifier(wire.channel.encode()));
                    continue;
                };
                let Some(channel) = state.registry.lookup(name) else {
                    debug!(node = %self.inner.id, channel = %name, "No local bridge for packet");
                    continue;
                };
                let correlation = match wire.correlation.as_deref().map(unpack_uuid) {
                    None => None,
                    Some(Ok(uuid)) => Some(uuid),
                    Some(Err(e)) => {
                        errors.push(e.into());
                        continue;
                    }
                };
                state.inbound.push(InboundPacket {
                    source,
                    channel,
                    payload: wire.args,
                    kind: wire.kind,
                    correlation,
                });
            }
        }

        for error in &errors {
            self.report(error);
        }
        self.drain_inbound();
    }

    /// Decode and accept a byte frame.
    pub fn receive_bytes(&self, source: PeerId, bytes: &[u8]) -> BridgeResult<()> {
        let frame = Frame::decode(bytes).map_err(|e| {
            BridgeError::Transport(crate::ports::TransportError::Encode(e.to_string()))
        })?;
        self.receive_frame(source, frame);
        Ok(())
    }

    fn drain_inbound(&self) {
        loop {
            let next = self.inner.state.lock().inbound.pop();
            let Some(packet) = next else {
                break;
            };
            self.dispatch(packet);
        }
    }

    fn dispatch(&self, packet: InboundPacket) {
        let snapshot = {
            let state = self.inner.state.lock();
            state
                .registry
                .get(packet.channel)
                .map(|entry| (entry.name.clone(), entry.inbound.clone()))
        };
        let Some((name, chain)) = snapshot else {
            debug!(channel = %packet.channel, "Dropping packet for destroyed bridge");
            return;
        };

        let payload = match chain.apply(packet.payload) {
            Ok(payload) => payload,
            Err(failure) => {
                self.report(&BridgeError::MiddlewareFailure {
                    channel: name,
                    stage: failure.stage,
                    reason: failure.error.to_string(),
                });
                return;
            }
        };

        match packet.kind {
            PacketKind::Fire => {
                let listeners = {
                    let mut state = self.inner.state.lock();
                    state
                        .registry
                        .get_mut(packet.channel)
                        .map(|entry| entry.take_dispatch_targets())
                        .unwrap_or_default()
                };
                for target in listeners {
                    // A listener may disconnect another one mid-delivery.
                    if !target.once && !self.has_listener(packet.channel, target.id) {
                        continue;
                    }
                    (target.listener)(packet.source, &payload);
                }
            }
            PacketKind::Invoke => {
                let Some(id) = packet.correlation else {
                    warn!(channel = %name, "Invoke without correlation id");
                    return;
                };
                self.answer_invoke(packet.channel, &name, packet.source, id, &payload);
            }
            PacketKind::Reply => {
                let Some(id) = packet.correlation else {
                    warn!(channel = %name, "Reply without correlation id");
                    return;
                };
                self.inner.state.lock().pending.complete(id, payload);
            }
        }
    }

    fn answer_invoke(
        &self,
        channel: ChannelId,
        name: &str,
        source: PeerId,
        id: Uuid,
        args: &[serde_json::Value],
    ) {
        if self.inner.role != Role::Coordinator {
            warn!(channel = name, peer = %source, "Peer node received an invoke");
            return;
        }
        let handler = {
            let state = self.inner.state.lock();
            state
                .registry
                .get(channel)
                .and_then(|entry| entry.invoke_handler.clone())
        };
        let Some(handler) = handler else {
            warn!(channel = name, peer = %source, "Invoke with no handler registered");
            return;
        };

        let reply = handler(source, args);
        if let Err(e) = self.enqueue(
            channel,
            name,
            reply,
            Target::Peer(source),
            PacketKind::Reply,
            Some(id),
        ) {
            self.report(&e);
        }
    }
}

impl FrameReceiver for Node {
    fn on_frame(&self, source: PeerId, frame: Frame) {
        self.receive_frame(source, frame);
    }
}

impl FrameReceiver for WeakNode {
    fn on_frame(&self, source: PeerId, frame: Frame) {
        match self.upgrade() {
            Some(node) => node.receive_frame(source, frame),
            None => debug!(peer = %source, "Frame for dropped node"),
        }
    }
}

/// Tick loop driving one node.
pub async fn scheduler_loop(node: WeakNode) {
    let mut last = tokio::time::Instant::now();
    loop {
        let Some(interval) = node.upgrade().map(|n| n.base_interval()) else {
            break;
        };
        tokio::time::sleep(interval).await;

        let Some(strong) = node.upgrade() else {
            break;
        };
        let now = tokio::time::Instant::now();
        let report = strong.tick(now.duration_since(last));
        last = now;
        if report.frames_sent > 0 {
            debug!(
                node = %strong.id(),
                frames = report.frames_sent,
                packets = report.packets_sent,
                "Tick flushed"
            );
        }
    }
}
