//! # Channel Registry
//!
//! Owns every live channel of a node, the identifier table that gives each
//! channel its wire token, and the callers waiting for a name to appear.
//!
//! ## Invariants
//!
//! - At most one live channel per name.
//! - Every live channel pins its token in the identifier table.
//! - Waiters for a name are resolved in the order they started waiting.

use crate::domain::config::{BridgeConfig, ReplicationRate};
use crate::domain::error::BridgeError;
use crate::domain::middleware::MiddlewareChain;
use crate::domain::packet::Payload;
use crate::domain::types::{ChannelId, PeerId, Role};
use serde_json::Value;
use shared_serdes::{IdentifierRegistry, Token};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Inbound listener: receives the sending peer and the arguments.
pub type Listener = Arc<dyn Fn(PeerId, &[Value]) + Send + Sync>;

/// Coordinator-side invoke handler; its return value becomes the reply.
pub type InvokeHandler = Arc<dyn Fn(PeerId, &[Value]) -> Payload + Send + Sync>;

/// Identifies one listener registration on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    listener: Listener,
    once: bool,
}

/// One listener scheduled for a delivery.
///
/// Persistent listeners must still be registered when their turn comes;
/// a one-shot listener was already removed when the delivery was taken.
pub struct DispatchTarget {
    pub id: ListenerId,
    pub once: bool,
    pub listener: Listener,
}

/// State of one live channel.
pub struct ChannelEntry {
    pub id: ChannelId,
    pub name: String,
    pub token: Token,
    pub role: Role,
    pub rate: ReplicationRate,
    /// Applied at the next tick boundary.
    pub staged_rate: Option<ReplicationRate>,
    pub allows_nil: bool,
    pub inbound: MiddlewareChain,
    pub outbound: MiddlewareChain,
    pub invoke_handler: Option<InvokeHandler>,
    /// Time accumulated since the last flush.
    pub since_flush: Duration,
    listeners: Vec<ListenerEntry>,
}

impl ChannelEntry {
    /// Listeners to call for one delivery. One-shot listeners are removed.
    pub fn take_dispatch_targets(&mut self) -> Vec<DispatchTarget> {
        let targets = self
            .listeners
            .iter()
            .map(|entry| DispatchTarget {
                id: entry.id,
                once: entry.once,
                listener: Arc::clone(&entry.listener),
            })
            .collect();
        self.listeners.retain(|entry| !entry.once);
        targets
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| entry.id != id);
        self.listeners.len() != before
    }

    #[must_use]
    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|entry| entry.id == id)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Interval used for the next tick, counting a staged change.
    #[must_use]
    pub fn next_interval(&self) -> Duration {
        self.staged_rate.unwrap_or(self.rate).interval()
    }

    /// Promote a staged rate. Returns true if the rate changed.
    pub fn apply_staged_rate(&mut self) -> bool {
        match self.staged_rate.take() {
            Some(rate) if rate != self.rate => {
                debug!(channel = %self.name, hz = rate.hz(), "Replication rate applied");
                self.rate = rate;
                true
            }
            _ => false,
        }
    }
}

/// Result of asking for a channel by name.
pub enum WaitOutcome {
    Ready(ChannelId),
    Pending(oneshot::Receiver<ChannelId>),
}

/// Registry of a node's live channels.
#[derive(Default)]
pub struct ChannelRegistry {
    identifiers: IdentifierRegistry,
    channels: HashMap<ChannelId, ChannelEntry>,
    by_name: HashMap<String, ChannelId>,
    waiters: HashMap<String, Vec<oneshot::Sender<ChannelId>>>,
    next_channel: u64,
    next_listener: u64,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel and wake everyone waiting for its name.
    ///
    /// An already-interned name keeps its token; otherwise it is interned.
    ///
    /// # Errors
    ///
    /// `BridgeError::DuplicateChannel` if `name` is live.
    pub fn register(
        &mut self,
        name: &str,
        role: Role,
        default_rate: ReplicationRate,
        config: BridgeConfig,
    ) -> Result<ChannelId, BridgeError> {
        if self.by_name.contains_key(name) {
            return Err(BridgeError::DuplicateChannel(name.to_string()));
        }

        let token = match self.identifiers.token_of(name) {
            Some(token) => token,
            None => self.identifiers.create_identifier(name)?,
        };
        self.identifiers.pin(token);

        let id = ChannelId(self.next_channel);
        self.next_channel += 1;

        self.channels.insert(
            id,
            ChannelEntry {
                id,
                name: name.to_string(),
                token,
                role,
                rate: config.replication_rate.unwrap_or(default_rate),
                staged_rate: None,
                allows_nil: config.allows_nil,
                inbound: config.inbound_middleware,
                outbound: config.outbound_middleware,
                invoke_handler: None,
                since_flush: Duration::ZERO,
                listeners: Vec::new(),
            },
        );
        self.by_name.insert(name.to_string(), id);
        info!(channel = name, token = %token, role = %role, "Bridge created");

        for waiter in self.waiters.remove(name).unwrap_or_default() {
            // A dropped receiver is a cancelled wait.
            let _ = waiter.send(id);
        }
        Ok(id)
    }

    /// The live channel named `name`, or a receiver resolved on creation.
    pub fn wait(&mut self, name: &str) -> WaitOutcome {
        if let Some(id) = self.by_name.get(name) {
            return WaitOutcome::Ready(*id);
        }
        let (tx, rx) = oneshot::channel();
        let waiters = self.waiters.entry(name.to_string()).or_default();
        waiters.retain(|waiter| !waiter.is_closed());
        waiters.push(tx);
        debug!(channel = name, "Waiting for bridge");
        WaitOutcome::Pending(rx)
    }

    /// Remove a channel, releasing its name and token.
    pub fn remove(&mut self, id: ChannelId) -> Option<ChannelEntry> {
        let entry = self.channels.remove(&id)?;
        self.by_name.remove(&entry.name);
        // The identifier may already have been destroyed by hand.
        if self.identifiers.token_of(&entry.name) == Some(entry.token) {
            let _ = self.identifiers.destroy_identifier(&entry.name);
        }
        self.identifiers.unpin(entry.token);
        info!(channel = %entry.name, "Bridge destroyed");
        Some(entry)
    }

    pub fn add_listener(
        &mut self,
        id: ChannelId,
        listener: Listener,
        once: bool,
    ) -> Option<ListenerId> {
        let entry = self.channels.get_mut(&id)?;
        let listener_id = ListenerId(self.next_listener);
        self.next_listener += 1;
        entry.listeners.push(ListenerEntry {
            id: listener_id,
            listener,
            once,
        });
        Some(listener_id)
    }

    #[must_use]
    pub fn get(&self, id: ChannelId) -> Option<&ChannelEntry> {
        self.channels.get(&id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut ChannelEntry> {
        self.channels.get_mut(&id)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ChannelId> {
        self.by_name.get(name).copied()
    }

    /// Live channel ids in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Smallest interval across channels, or `fallback` with none.
    #[must_use]
    pub fn base_interval(&self, fallback: Duration) -> Duration {
        self.channels
            .values()
            .map(ChannelEntry::next_interval)
            .min()
            .unwrap_or(fallback)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn identifiers(&self) -> &IdentifierRegistry {
        &self.identifiers
    }

    pub fn identifiers_mut(&mut self) -> &mut IdentifierRegistry {
        &mut self.identifiers
    }
}
