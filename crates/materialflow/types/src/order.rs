//! Orders and order-step definitions

use crate::Expression;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three order kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Transport,
    Move,
    Action,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Transport => write!(f, "transport"),
            OrderKind::Move => write!(f, "move"),
            OrderKind::Action => write!(f, "action"),
        }
    }
}

/// A transport order: every pickup step, then every delivery step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportOrder {
    pub pickups: Vec<String>,
    pub deliveries: Vec<String>,
}

impl TransportOrder {
    pub fn new<P, D>(pickups: P, deliveries: D) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            pickups: pickups.into_iter().map(Into::into).collect(),
            deliveries: deliveries.into_iter().map(Into::into).collect(),
        }
    }
}

/// A move order referencing one move step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveOrder {
    pub step: String,
}

/// An action order referencing one action step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOrder {
    pub step: String,
}

/// Definition of one order step, shared by all three catalogs
///
/// Transport and move steps carry a location; action steps carry a
/// parameter payload forwarded to listeners.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderStep {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub started_by: Option<Expression>,
    #[serde(default)]
    pub finished_by: Option<Expression>,
    /// Task to run once the step completed, before the step counts as done
    #[serde(default)]
    pub on_done: Option<String>,
}

impl OrderStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_started_by(mut self, expression: Expression) -> Self {
        self.started_by = Some(expression);
        self
    }

    pub fn with_finished_by(mut self, expression: Expression) -> Self {
        self.finished_by = Some(expression);
        self
    }

    pub fn with_on_done(mut self, task: impl Into<String>) -> Self {
        self.on_done = Some(task.into());
        self
    }
}
