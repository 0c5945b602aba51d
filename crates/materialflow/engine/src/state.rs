//! Mutable run state of one orchestrator
//!
//! Everything an operation may change lives in [`RunState`], so that an
//! operation can be rolled back by restoring a clone taken before it ran.

use crate::listener::LifecycleEvent;
use crate::store::InstanceStore;
use chrono::{DateTime, Utc};
use materialflow_net::{
    ActivationIndex, ActivationKey, ActivationTable, LoopSlot, OrderSlot, Signal, StepSlot,
    TaskSlot, TokenFlow,
};
use materialflow_types::{ActivationId, Event, Expression, IdGenerator, StepStatus};
use std::collections::{BTreeSet, HashMap};

/// Which gate of an activation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GatePhase {
    Start,
    Finish,
}

impl GatePhase {
    pub fn signal(&self) -> Signal {
        match self {
            GatePhase::Start => Signal::StartGate,
            GatePhase::Finish => Signal::FinishGate,
        }
    }
}

/// A gate that was reached while its expression was false
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GateKey {
    pub task: TaskSlot,
    pub step: Option<StepSlot>,
    pub phase: GatePhase,
}

/// State changed by callbacks, separate from the token flow so that a
/// callback can borrow it while the flow fires transitions
#[derive(Clone, Debug, Default)]
pub struct Activity {
    pub activations: ActivationTable,
    pub active_tasks: BTreeSet<TaskSlot>,
    pub active_orders: BTreeSet<OrderSlot>,
    pub active_steps: BTreeSet<StepSlot>,
    /// External events the process currently waits for
    pub awaited: Vec<Event>,
    pub pending_gates: BTreeSet<GateKey>,
    pub instances: InstanceStore,
    pub loop_counters: HashMap<LoopSlot, u64>,
    pub ids: IdGenerator,
    /// Notifications of the running operation, dispatched on commit
    pub outbox: Vec<LifecycleEvent>,
    pub started_at: Option<DateTime<Utc>>,
    pub running: bool,
    pub finished: bool,
    /// Set when the process finished; timers are cancelled on commit
    pub stop_timers: bool,
}

impl Activity {
    pub fn notify(&mut self, event: LifecycleEvent) {
        self.outbox.push(event);
    }

    pub fn expect(&mut self, event: Event) {
        if !self.awaited.contains(&event) {
            self.awaited.push(event);
        }
    }

    pub fn forget(&mut self, event: &Event) {
        self.awaited.retain(|e| e != event);
    }

    pub fn task_id(&self, slot: TaskSlot) -> ActivationId {
        self.activations.task(slot).id.clone()
    }

    pub fn step_id(&self, slot: StepSlot) -> ActivationId {
        self.activations.step(slot).id.clone()
    }

    /// Current index key of a gate's activation
    pub fn gate_activation(&self, gate: &GateKey) -> ActivationKey {
        ActivationKey {
            task: self.task_id(gate.task),
            step: gate.step.map(|s| self.step_id(s)),
        }
    }

    /// The expression guarding `gate`, if the activation declares one
    pub fn gate_expression(&self, gate: &GateKey) -> Option<Expression> {
        let activations = &self.activations;
        let expression = match (gate.step, gate.phase) {
            (Some(step), GatePhase::Start) => &activations.step(step).started_by,
            (Some(step), GatePhase::Finish) => &activations.step(step).finished_by,
            (None, GatePhase::Start) => &activations.task(gate.task).started_by,
            (None, GatePhase::Finish) => &activations.task(gate.task).finished_by,
        };
        expression.clone()
    }

    /// The `started_by` or `finished_by` event that satisfies `gate`
    pub fn gate_event(&self, gate: &GateKey) -> Event {
        let key = self.gate_activation(gate);
        match gate.phase {
            GatePhase::Start => Event::started_by(&key.task, key.step.as_ref()),
            GatePhase::Finish => Event::finished_by(&key.task, key.step.as_ref()),
        }
    }

    pub fn step_event(&self, step: StepSlot, status: StepStatus) -> Event {
        let activation = self.activations.step(step);
        Event::order_step_update(&self.task_id(activation.task), &activation.id, status)
    }

    /// Drop a pending gate and the event it waits for
    pub fn clear_gate(&mut self, gate: &GateKey) {
        if self.pending_gates.remove(gate) {
            let event = self.gate_event(gate);
            self.forget(&event);
        }
    }

    /// Drop pending gates that were satisfied through the net
    pub fn prune_gates(&mut self, index: &ActivationIndex) {
        let satisfied: Vec<GateKey> = self
            .pending_gates
            .iter()
            .filter(|gate| index.is_spent(&self.gate_activation(gate), gate.phase.signal()))
            .copied()
            .collect();
        for gate in &satisfied {
            self.clear_gate(gate);
        }
    }

    /// Seconds since the run started
    pub fn elapsed_seconds(&self) -> f64 {
        self.started_at
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

/// Everything an orchestrator operation can change
#[derive(Clone, Debug)]
pub struct RunState {
    pub flow: TokenFlow,
    pub activity: Activity,
}
