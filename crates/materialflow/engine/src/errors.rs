//! Error types for the materialflow engine

use materialflow_net::{BuildErrors, RuntimeError};

/// Errors raised while evaluating a gate, condition, loop limit or rule
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Type mismatch: '{operator}' cannot be applied to {operands}")]
    TypeMismatch { operator: String, operands: String },

    #[error("Expression '{expression}' yielded a {found}, expected a boolean")]
    NotBoolean {
        expression: String,
        found: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    #[error("Instance '{instance}' has no attribute '{attribute}'")]
    UnknownAttribute { instance: String, attribute: String },

    #[error("Attribute '{attribute}' of '{instance}' does not name an instance")]
    NotAnInstance { instance: String, attribute: String },

    #[error("Attribute path '{0}' does not end in a primitive value")]
    IncompletePath(String),

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Rule '{rule}' is missing argument '{parameter}'")]
    MissingArgument { rule: String, parameter: String },

    #[error("Rule '{rule}' has no parameter '{parameter}'")]
    UnknownParameter { rule: String, parameter: String },

    #[error("Rule '{rule}' got parameter '{parameter}' twice")]
    DuplicateArgument { rule: String, parameter: String },

    #[error("Rule '{rule}' takes {expected} argument(s), got {found}")]
    TooManyArguments {
        rule: String,
        expected: usize,
        found: usize,
    },

    #[error("Evaluation nested deeper than {limit} levels")]
    RecursionLimit { limit: usize },

    #[error("Loop limit must be a non-negative whole number, got {0}")]
    InvalidLoopLimit(String),
}

/// Result alias for expression evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors surfaced by the orchestrator and the scheduler service
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Process rejected:\n{0}")]
    Build(#[from] BuildErrors),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Cannot schedule timer '{instance}': {reason}")]
    TimerScheduling { instance: String, reason: String },

    #[error("Process already started")]
    AlreadyStarted,

    #[error("Process not started")]
    NotStarted,

    #[error("Scheduler service stopped")]
    ServiceStopped,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias for orchestrator operations
pub type EngineResult<T> = Result<T, EngineError>;
