//! Lifecycle notifications
//!
//! The orchestrator queues a [`LifecycleEvent`] for every observable step of
//! a run and hands them to its listeners once the operation that produced
//! them has committed. A failed operation notifies nobody.

use materialflow_types::{ActivationId, OrderKind};
use serde::Serialize;
use serde_json::Value as Json;
use std::sync::{Arc, Mutex, PoisonError};

/// An observable step of a process run
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ProcessStarted,
    TaskStarted {
        task_id: ActivationId,
        task_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        constraints: Option<Json>,
    },
    TaskFinished {
        task_id: ActivationId,
        task_name: String,
    },
    OrderStarted {
        order_id: ActivationId,
        task_id: ActivationId,
        kind: OrderKind,
    },
    OrderFinished {
        order_id: ActivationId,
        task_id: ActivationId,
        kind: OrderKind,
    },
    StartGateWaiting {
        task_id: ActivationId,
        #[serde(skip_serializing_if = "Option::is_none")]
        order_step_id: Option<ActivationId>,
        expression: String,
    },
    FinishGateWaiting {
        task_id: ActivationId,
        #[serde(skip_serializing_if = "Option::is_none")]
        order_step_id: Option<ActivationId>,
        expression: String,
    },
    WaitingForMove {
        order_step_id: ActivationId,
        task_id: ActivationId,
        step_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    MovedToLocation {
        order_step_id: ActivationId,
        task_id: ActivationId,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    WaitingForAction {
        order_step_id: ActivationId,
        task_id: ActivationId,
        step_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parameters: Option<Json>,
    },
    ActionExecuted {
        order_step_id: ActivationId,
        task_id: ActivationId,
    },
    InstanceUpdated {
        instance_name: String,
        attributes: Vec<String>,
    },
    ProcessFinished,
}

impl LifecycleEvent {
    /// The snake_case name used in the serialized form
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::ProcessStarted => "process_started",
            LifecycleEvent::TaskStarted { .. } => "task_started",
            LifecycleEvent::TaskFinished { .. } => "task_finished",
            LifecycleEvent::OrderStarted { .. } => "order_started",
            LifecycleEvent::OrderFinished { .. } => "order_finished",
            LifecycleEvent::StartGateWaiting { .. } => "start_gate_waiting",
            LifecycleEvent::FinishGateWaiting { .. } => "finish_gate_waiting",
            LifecycleEvent::WaitingForMove { .. } => "waiting_for_move",
            LifecycleEvent::MovedToLocation { .. } => "moved_to_location",
            LifecycleEvent::WaitingForAction { .. } => "waiting_for_action",
            LifecycleEvent::ActionExecuted { .. } => "action_executed",
            LifecycleEvent::InstanceUpdated { .. } => "instance_updated",
            LifecycleEvent::ProcessFinished => "process_finished",
        }
    }
}

/// Receives lifecycle notifications
pub trait LifecycleListener: Send {
    fn on_event(&mut self, event: &LifecycleEvent);
}

impl<F> LifecycleListener for F
where
    F: FnMut(&LifecycleEvent) + Send,
{
    fn on_event(&mut self, event: &LifecycleEvent) {
        self(event)
    }
}

/// A listener that keeps every notification, readable from any clone
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Serialized names of the recorded events, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(LifecycleEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LifecycleListener for EventLog {
    fn on_event(&mut self, event: &LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
