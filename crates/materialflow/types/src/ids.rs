//! Activation identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a task, order or order-step activation
///
/// Events reference activations by this id. A loop iteration after the
/// first re-mints the ids of every activation inside the loop body.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivationId(pub String);

impl ActivationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActivationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How activation ids are produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Random v4 UUIDs
    #[default]
    Uuid,
    /// Decimal counter starting at zero, for reproducible runs and tests
    Sequential,
}

/// Source of fresh activation ids
///
/// The generator is handed from the graph builder to the orchestrator so
/// that ids minted at runtime never collide with build-time ids.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    strategy: IdStrategy,
    next: u64,
}

impl IdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self { strategy, next: 0 }
    }

    pub fn sequential() -> Self {
        Self::new(IdStrategy::Sequential)
    }

    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    /// Produce the next id
    pub fn next_id(&mut self) -> ActivationId {
        match self.strategy {
            IdStrategy::Uuid => ActivationId::generate(),
            IdStrategy::Sequential => {
                let id = ActivationId(self.next.to_string());
                self.next += 1;
                id
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(IdStrategy::default())
    }
}
