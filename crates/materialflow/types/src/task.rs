//! Tasks and statements

use crate::{ActionOrder, Expression, MoveOrder, TransportOrder};
use serde::{Deserialize, Serialize};

/// A named unit of work: an ordered list of statements with optional gates
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub started_by: Option<Expression>,
    #[serde(default)]
    pub finished_by: Option<Expression>,
    /// Opaque constraints forwarded to listeners when the task starts
    #[serde(default)]
    pub constraints: Option<serde_json::Value>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
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

    pub fn with_constraints(mut self, constraints: serde_json::Value) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

/// One statement of a task body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    Transport(TransportOrder),
    Move(MoveOrder),
    Action(ActionOrder),
    TaskCall(TaskCall),
    Condition(Condition),
    WhileLoop(WhileLoop),
    CountingLoop(CountingLoop),
}

impl Statement {
    pub fn transport<P, D>(pickups: P, deliveries: D) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Statement::Transport(TransportOrder::new(pickups, deliveries))
    }

    pub fn move_to(step: impl Into<String>) -> Self {
        Statement::Move(MoveOrder { step: step.into() })
    }

    pub fn action(step: impl Into<String>) -> Self {
        Statement::Action(ActionOrder { step: step.into() })
    }

    pub fn call(task: impl Into<String>) -> Self {
        Statement::TaskCall(TaskCall { task: task.into() })
    }
}

/// Invocation of another task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskCall {
    pub task: String,
}

/// `if expression { passed } else { failed }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub expression: Expression,
    pub passed: Vec<Statement>,
    #[serde(default)]
    pub failed: Vec<Statement>,
}

/// `while expression { body }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhileLoop {
    pub expression: Expression,
    pub body: Vec<Statement>,
}

/// `loop i to limit { body }`, where `limit` evaluates to a whole number
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountingLoop {
    pub limit: Expression,
    pub body: Vec<Statement>,
}
