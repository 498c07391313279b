//! Node and bridge configuration.

use crate::domain::error::ConfigError;
use crate::domain::middleware::MiddlewareChain;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default flushes per second for new bridges.
pub const DEFAULT_SEND_RATE: u32 = 60;

/// Default receive rate.
pub const DEFAULT_RECEIVE_RATE: u32 = 60;

/// Default invoke timeout.
pub const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 10_000;

/// Default number of finished correlation ids remembered.
pub const DEFAULT_RETIRED_CORRELATIONS: usize = 4096;

/// Flush frequency of a bridge, in flushes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ReplicationRate(u32);

impl ReplicationRate {
    /// Highest rate whose interval is still at least one nanosecond.
    pub const MAX_HZ: u32 = 1_000_000_000;

    /// # Errors
    ///
    /// `ConfigError::InvalidRate` for zero or anything above [`Self::MAX_HZ`].
    pub fn per_second(hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::InvalidRate("rate cannot be 0".into()));
        }
        if hz > Self::MAX_HZ {
            return Err(ConfigError::InvalidRate(format!(
                "rate {hz} exceeds {} Hz",
                Self::MAX_HZ
            )));
        }
        Ok(Self(hz))
    }

    #[must_use]
    pub fn hz(self) -> u32 {
        self.0
    }

    /// Time between two flushes.
    #[must_use]
    pub fn interval(self) -> Duration {
        Duration::from_secs(1) / self.0
    }
}

impl TryFrom<u32> for ReplicationRate {
    type Error = ConfigError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        Self::per_second(hz)
    }
}

impl From<ReplicationRate> for u32 {
    fn from(rate: ReplicationRate) -> Self {
        rate.0
    }
}

/// Process-wide defaults applied when a node starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Default replication rate (Hz) for bridges created without one.
    pub send_rate: u32,
    /// Receive rate (Hz). Inbound dispatch is immediate; recorded only.
    pub receive_rate: u32,
    /// Timeout for invokes that do not pass their own.
    pub invoke_timeout_ms: u64,
    /// Log every flushed frame at info level.
    pub log_sends: bool,
    /// Log every received frame at info level.
    pub log_receives: bool,
    /// How many finished correlation ids to remember.
    pub retired_correlation_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            send_rate: DEFAULT_SEND_RATE,
            receive_rate: DEFAULT_RECEIVE_RATE,
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT_MS,
            log_sends: false,
            log_receives: false,
            retired_correlation_capacity: DEFAULT_RETIRED_CORRELATIONS,
        }
    }
}

impl NodeConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_rate == 0 {
            return Err(ConfigError::InvalidRate("send_rate cannot be 0".into()));
        }
        if self.receive_rate == 0 {
            return Err(ConfigError::InvalidRate("receive_rate cannot be 0".into()));
        }
        if self.invoke_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "invoke_timeout_ms cannot be 0".into(),
            ));
        }
        if self.retired_correlation_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "retired_correlation_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }
}

/// Per-bridge settings supplied at creation.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Falls back to the node's send rate.
    pub replication_rate: Option<ReplicationRate>,
    pub allows_nil: bool,
    pub inbound_middleware: MiddlewareChain,
    pub outbound_middleware: MiddlewareChain,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            replication_rate: None,
            allows_nil: true,
            inbound_middleware: MiddlewareChain::new(),
            outbound_middleware: MiddlewareChain::new(),
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn replication_rate(mut self, rate: ReplicationRate) -> Self {
        self.replication_rate = Some(rate);
        self
    }

    #[must_use]
    pub fn allows_nil(mut self, allows: bool) -> Self {
        self.allows_nil = allows;
        self
    }

    #[must_use]
    pub fn inbound_middleware(mut self, chain: MiddlewareChain) -> Self {
        self.inbound_middleware = chain;
        self
    }

    #[must_use]
    pub fn outbound_middleware(mut self, chain: MiddlewareChain) -> Self {
        self.outbound_middleware = chain;
        self
    }
}
