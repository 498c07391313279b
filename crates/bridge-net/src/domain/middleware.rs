//! # Middleware Pipeline
//!
//! Ordered payload transforms applied at the bridge boundaries.
//!
//! ```text
//! outbound: args ─→ f ─→ g ─→ enqueue        (payload = g(f(args)))
//! inbound:  frame ─→ h ─→ k ─→ listeners
//! ```
//!
//! A failing stage aborts the whole packet; no partially transformed payload
//! is ever enqueued or delivered.

use crate::domain::error::MiddlewareError;
use crate::domain::packet::Payload;
use std::fmt;
use std::sync::Arc;

/// One transform stage.
pub type Middleware = Arc<dyn Fn(Payload) -> Result<Payload, MiddlewareError> + Send + Sync>;

/// Wrap a closure as a middleware stage.
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Payload) -> Result<Payload, MiddlewareError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered chain of stages. Empty chain is the identity transform.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Vec<Middleware>,
}

/// A stage failure with the index of the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: usize,
    pub error: MiddlewareError,
}

impl MiddlewareChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_stages(stages: Vec<Middleware>) -> Self {
        Self { stages }
    }

    /// Append a stage.
    #[must_use]
    pub fn then<F>(mut self, f: F) -> Self
    where
        F: Fn(Payload) -> Result<Payload, MiddlewareError> + Send + Sync + 'static,
    {
        self.stages.push(Arc::new(f));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, each on the previous stage's output.
    ///
    /// # Errors
    ///
    /// The first failing stage; its input and everything after it is dropped.
    pub fn apply(&self, payload: Payload) -> Result<Payload, StageFailure> {
        self.stages
            .iter()
            .enumerate()
            .try_fold(payload, |current, (stage, transform)| {
                transform(current).map_err(|error| StageFailure { stage, error })
            })
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}
