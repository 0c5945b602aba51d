//! Callbacks bound to transitions

use crate::activation::{ConditionSlot, LoopSlot, OrderSlot, StepSlot, TaskSlot};
use crate::TransitionId;
use std::collections::HashMap;
use std::fmt;

/// What a transition signals when it fires
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    TaskStarted,
    TaskFinished,
    OrderStarted,
    OrderFinished,
    StartGateReached,
    FinishGateReached,
    WaitingForMove,
    WaitingForAction,
    MovedToLocation,
    ActionExecuted,
    StepFinished,
    ConditionReached,
    LoopCheck,
}

impl CallbackKind {
    /// Whether the kind is part of the observable lifecycle rather than
    /// internal bookkeeping of the orchestrator
    pub fn is_lifecycle(&self) -> bool {
        !matches!(
            self,
            CallbackKind::StepFinished | CallbackKind::ConditionReached | CallbackKind::LoopCheck
        )
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A callback together with the activations it concerns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackBinding {
    TaskStarted(TaskSlot),
    TaskFinished(TaskSlot),
    OrderStarted(OrderSlot),
    OrderFinished(OrderSlot),
    StartGateReached {
        task: TaskSlot,
        step: Option<StepSlot>,
    },
    FinishGateReached {
        task: TaskSlot,
        step: Option<StepSlot>,
    },
    WaitingForMove(StepSlot),
    WaitingForAction(StepSlot),
    MovedToLocation(StepSlot),
    ActionExecuted(StepSlot),
    StepFinished(StepSlot),
    ConditionReached(ConditionSlot),
    LoopCheck(LoopSlot),
}

impl CallbackBinding {
    pub fn kind(&self) -> CallbackKind {
        match self {
            CallbackBinding::TaskStarted(_) => CallbackKind::TaskStarted,
            CallbackBinding::TaskFinished(_) => CallbackKind::TaskFinished,
            CallbackBinding::OrderStarted(_) => CallbackKind::OrderStarted,
            CallbackBinding::OrderFinished(_) => CallbackKind::OrderFinished,
            CallbackBinding::StartGateReached { .. } => CallbackKind::StartGateReached,
            CallbackBinding::FinishGateReached { .. } => CallbackKind::FinishGateReached,
            CallbackBinding::WaitingForMove(_) => CallbackKind::WaitingForMove,
            CallbackBinding::WaitingForAction(_) => CallbackKind::WaitingForAction,
            CallbackBinding::MovedToLocation(_) => CallbackKind::MovedToLocation,
            CallbackBinding::ActionExecuted(_) => CallbackKind::ActionExecuted,
            CallbackBinding::StepFinished(_) => CallbackKind::StepFinished,
            CallbackBinding::ConditionReached(_) => CallbackKind::ConditionReached,
            CallbackBinding::LoopCheck(_) => CallbackKind::LoopCheck,
        }
    }
}

/// Transition to ordered callback bindings
#[derive(Clone, Debug, Default)]
pub struct CallbackRegistry {
    bindings: HashMap<TransitionId, Vec<CallbackBinding>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a callback; bindings of one transition run in registration order
    pub fn register(&mut self, transition: TransitionId, binding: CallbackBinding) {
        self.bindings.entry(transition).or_default().push(binding);
    }

    pub fn bindings(&self, transition: TransitionId) -> &[CallbackBinding] {
        self.bindings
            .get(&transition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Transitions carrying at least one binding of `kind`
    pub fn transitions_of(&self, kind: CallbackKind) -> Vec<TransitionId> {
        let mut found: Vec<_> = self
            .bindings
            .iter()
            .filter(|(_, bindings)| bindings.iter().any(|b| b.kind() == kind))
            .map(|(t, _)| *t)
            .collect();
        found.sort();
        found
    }

    pub fn len(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
