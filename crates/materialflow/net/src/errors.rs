//! Error types for net compilation and token flow

use std::fmt;

/// Kinds of named constructs in a process model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstructKind {
    Struct,
    Instance,
    Rule,
    Task,
    TransportStep,
    MoveStep,
    ActionStep,
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstructKind::Struct => "struct",
            ConstructKind::Instance => "instance",
            ConstructKind::Rule => "rule",
            ConstructKind::Task => "task",
            ConstructKind::TransportStep => "transport order step",
            ConstructKind::MoveStep => "move order step",
            ConstructKind::ActionStep => "action order step",
        };
        f.write_str(name)
    }
}

/// One structural problem found while compiling a process
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Duplicate {kind} name: {name}")]
    Duplicate { kind: ConstructKind, name: String },

    #[error("Root task not found: {0}")]
    MissingRootTask(String),

    #[error("{referrer} references unknown {kind} '{name}'")]
    Dangling {
        kind: ConstructKind,
        name: String,
        referrer: String,
    },

    #[error("Recursive task call: {}", .0.join(" -> "))]
    RecursiveCall(Vec<String>),

    #[error("Transport order in task '{task}' has no {missing} steps")]
    EmptyTransport { task: String, missing: &'static str },
}

/// Every structural problem of a process, reported together
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildErrors(pub Vec<BuildError>);

impl BuildErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildError> {
        self.0.iter()
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} build error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildErrors {}

impl From<BuildError> for BuildErrors {
    fn from(error: BuildError) -> Self {
        BuildErrors(vec![error])
    }
}

pub type BuildResult<T> = Result<T, BuildErrors>;

/// Errors raised while tokens flow through a net
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("Cascade exceeded {limit} transition firings")]
    CascadeLimit { limit: usize },
}
