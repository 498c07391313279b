//! Pending invoke store.
//!
//! Maps correlation ids to callers suspended on an invoke.
//!
//! Flow:
//! 1. The invoking bridge creates a UUID and calls `register()` for a receiver
//! 2. The invoke packet is enqueued with the UUID
//! 3. The reply dispatch calls `complete()` with the reply payload
//! 4. The caller awaits the receiver, or times out and calls `expire()`
//!
//! Finished ids (completed or expired) are remembered in a bounded retired
//! set, so they are never registered again and late replies are ignored.

use crate::domain::error::BridgeError;
use crate::domain::packet::Payload;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

struct PendingInvoke {
    sender: oneshot::Sender<Payload>,
    channel: String,
    created_at: Instant,
}

/// Statistics for the pending invoke store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeStats {
    pub registered: u64,
    pub completed: u64,
    pub timed_out: u64,
    /// Replies for unknown or retired ids.
    pub unmatched: u64,
}

pub struct PendingInvokes {
    pending: HashMap<Uuid, PendingInvoke>,
    retired: HashSet<Uuid>,
    retired_order: VecDeque<Uuid>,
    retired_capacity: usize,
    stats: InvokeStats,
}

impl PendingInvokes {
    #[must_use]
    pub fn new(retired_capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            retired: HashSet::new(),
            retired_order: VecDeque::new(),
            retired_capacity: retired_capacity.max(1),
            stats: InvokeStats::default(),
        }
    }

    /// Register a pending invoke.
    ///
    /// # Errors
    ///
    /// `BridgeError::CorrelationCollision` if `id` is pending or retired.
    pub fn register(
        &mut self,
        id: Uuid,
        channel: &str,
    ) -> Result<oneshot::Receiver<Payload>, BridgeError> {
        if self.pending.contains_key(&id) || self.retired.contains(&id) {
            return Err(BridgeError::CorrelationCollision(id));
        }

        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            id,
            PendingInvoke {
                sender,
                channel: channel.to_string(),
                created_at: Instant::now(),
            },
        );
        self.stats.registered += 1;
        debug!(correlation_id = %id, channel, "Registered pending invoke");
        Ok(receiver)
    }

    /// Resolve a pending invoke with its reply.
    ///
    /// Returns false for unknown, retired or abandoned ids.
    pub fn complete(&mut self, id: Uuid, payload: Payload) -> bool {
        let Some(pending) = self.pending.remove(&id) else {
            self.stats.unmatched += 1;
            warn!(correlation_id = %id, "Reply for unknown or expired correlation id");
            return false;
        };
        self.retire(id);

        let elapsed = pending.created_at.elapsed();
        if pending.sender.send(payload).is_err() {
            debug!(correlation_id = %id, channel = pending.channel, "Invoke caller went away");
            return false;
        }
        self.stats.completed += 1;
        debug!(
            correlation_id = %id,
            channel = pending.channel,
            response_time_ms = elapsed.as_millis() as u64,
            "Completed pending invoke"
        );
        true
    }

    /// Discard a timed-out invoke.
    pub fn expire(&mut self, id: Uuid) -> bool {
        let Some(pending) = self.pending.remove(&id) else {
            return false;
        };
        self.retire(id);
        self.stats.timed_out += 1;
        warn!(correlation_id = %id, channel = pending.channel, "Invoke timed out");
        true
    }

    /// Drop a pending invoke whose request never left (e.g. enqueue failed).
    pub fn cancel(&mut self, id: Uuid) -> bool {
        let removed = self.pending.remove(&id).is_some();
        if removed {
            self.retire(id);
        }
        removed
    }

    fn retire(&mut self, id: Uuid) {
        if self.retired.insert(id) {
            self.retired_order.push_back(id);
        }
        while self.retired_order.len() > self.retired_capacity {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }

    #[must_use]
    pub fn is_pending(&self, id: &Uuid) -> bool {
        self.pending.contains_key(id)
    }

    #[must_use]
    pub fn is_retired(&self, id: &Uuid) -> bool {
        self.retired.contains(id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> InvokeStats {
        self.stats
    }
}
