//! Activation records created by the builder
//!
//! Callbacks refer to activations through slots, which are stable for the
//! life of the net. The id stored in a slot is not: loop iterations after
//! the first replace it with a freshly minted one.

use crate::PlaceId;
use materialflow_types::{ActivationId, Expression, OrderKind};
use serde::Serialize;

macro_rules! slot {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub usize);
    };
}

slot!(
    /// Position of a task activation in the [`ActivationTable`]
    TaskSlot
);
slot!(
    /// Position of an order activation
    OrderSlot
);
slot!(
    /// Position of an order-step activation
    StepSlot
);
slot!(ConditionSlot);
slot!(LoopSlot);

/// One compiled task call (the root task included)
#[derive(Clone, Debug)]
pub struct TaskActivation {
    pub id: ActivationId,
    pub name: String,
    pub parent: Option<TaskSlot>,
    pub in_loop: bool,
    pub first_iteration: bool,
    pub started_by: Option<Expression>,
    pub finished_by: Option<Expression>,
    pub constraints: Option<serde_json::Value>,
    /// Terminal place; a token here retires the activation
    pub finished: PlaceId,
}

/// One compiled transport, move or action order
#[derive(Clone, Debug)]
pub struct OrderActivation {
    pub id: ActivationId,
    pub kind: OrderKind,
    pub task: TaskSlot,
    pub steps: Vec<StepSlot>,
    pub in_loop: bool,
    pub first_iteration: bool,
    pub finished: PlaceId,
}

/// Position of a step within its order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    Pickup,
    Delivery,
    Single,
}

/// One compiled order step
#[derive(Clone, Debug)]
pub struct StepActivation {
    pub id: ActivationId,
    pub name: String,
    pub kind: OrderKind,
    pub role: StepRole,
    pub order: OrderSlot,
    pub task: TaskSlot,
    pub location: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub started_by: Option<Expression>,
    pub finished_by: Option<Expression>,
    pub finished: PlaceId,
}

/// A compiled `if` statement and its two control places
#[derive(Clone, Debug)]
pub struct ConditionActivation {
    pub task: TaskSlot,
    pub expression: Expression,
    pub passed: PlaceId,
    pub failed: PlaceId,
}

/// Loop flavors
#[derive(Clone, Debug)]
pub enum LoopKind {
    While(Expression),
    Counting(Expression),
}

/// A compiled loop and its two control places
#[derive(Clone, Debug)]
pub struct LoopActivation {
    pub task: TaskSlot,
    pub kind: LoopKind,
    pub proceed: PlaceId,
    pub done: PlaceId,
}

/// Every activation of a compiled process
#[derive(Clone, Debug, Default)]
pub struct ActivationTable {
    tasks: Vec<TaskActivation>,
    orders: Vec<OrderActivation>,
    steps: Vec<StepActivation>,
    conditions: Vec<ConditionActivation>,
    loops: Vec<LoopActivation>,
}

impl ActivationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_task(&mut self, task: TaskActivation) -> TaskSlot {
        self.tasks.push(task);
        TaskSlot(self.tasks.len() - 1)
    }

    pub fn push_order(&mut self, order: OrderActivation) -> OrderSlot {
        self.orders.push(order);
        OrderSlot(self.orders.len() - 1)
    }

    /// Add a step and link it to its order
    pub fn push_step(&mut self, step: StepActivation) -> StepSlot {
        let order = step.order;
        self.steps.push(step);
        let slot = StepSlot(self.steps.len() - 1);
        self.orders[order.0].steps.push(slot);
        slot
    }

    pub fn push_condition(&mut self, condition: ConditionActivation) -> ConditionSlot {
        self.conditions.push(condition);
        ConditionSlot(self.conditions.len() - 1)
    }

    pub fn push_loop(&mut self, l: LoopActivation) -> LoopSlot {
        self.loops.push(l);
        LoopSlot(self.loops.len() - 1)
    }

    pub fn task(&self, slot: TaskSlot) -> &TaskActivation {
        &self.tasks[slot.0]
    }

    pub fn task_mut(&mut self, slot: TaskSlot) -> &mut TaskActivation {
        &mut self.tasks[slot.0]
    }

    pub fn order(&self, slot: OrderSlot) -> &OrderActivation {
        &self.orders[slot.0]
    }

    pub fn order_mut(&mut self, slot: OrderSlot) -> &mut OrderActivation {
        &mut self.orders[slot.0]
    }

    pub fn step(&self, slot: StepSlot) -> &StepActivation {
        &self.steps[slot.0]
    }

    pub fn step_mut(&mut self, slot: StepSlot) -> &mut StepActivation {
        &mut self.steps[slot.0]
    }

    pub fn condition(&self, slot: ConditionSlot) -> &ConditionActivation {
        &self.conditions[slot.0]
    }

    pub fn loop_activation(&self, slot: LoopSlot) -> &LoopActivation {
        &self.loops[slot.0]
    }

    pub fn tasks(&self) -> impl Iterator<Item = (TaskSlot, &TaskActivation)> {
        self.tasks.iter().enumerate().map(|(i, t)| (TaskSlot(i), t))
    }

    pub fn orders(&self) -> impl Iterator<Item = (OrderSlot, &OrderActivation)> {
        self.orders.iter().enumerate().map(|(i, o)| (OrderSlot(i), o))
    }

    pub fn steps(&self) -> impl Iterator<Item = (StepSlot, &StepActivation)> {
        self.steps.iter().enumerate().map(|(i, s)| (StepSlot(i), s))
    }

    /// Slot of the task currently carrying `id`
    pub fn find_task(&self, id: &ActivationId) -> Option<TaskSlot> {
        self.tasks().find(|(_, t)| &t.id == id).map(|(slot, _)| slot)
    }

    /// Slot of the step currently carrying `id`
    pub fn find_step(&self, id: &ActivationId) -> Option<StepSlot> {
        self.steps().find(|(_, s)| &s.id == id).map(|(slot, _)| slot)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}
