//! Callback handling: what happens when a bound transition fires
//!
//! [`CallbackContext`] is the orchestrator's [`FireHandler`]. It keeps the
//! activity registries in step with the net, re-mints activation ids for
//! loop iterations, evaluates gates, conditions and loop checks, and queues
//! lifecycle notifications.

use crate::errors::{EngineError, EvalError};
use crate::evaluator::ExpressionEvaluator;
use crate::listener::LifecycleEvent;
use crate::state::{Activity, GateKey, GatePhase};
use crate::store::RuleBook;
use materialflow_net::{
    ActivationIndex, CallbackBinding, ConditionSlot, FireHandler, LoopKind, LoopSlot, NetEvent,
    OrderSlot, StepSlot, TaskSlot, WorkItem,
};
use materialflow_types::{Expression, StepStatus, Value};

/// Immutable collaborators of a cascade
pub struct Statics<'a> {
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub rules: &'a RuleBook,
    pub root: TaskSlot,
}

/// The orchestrator's fire handler for one cascade
pub struct CallbackContext<'a> {
    activity: &'a mut Activity,
    statics: &'a Statics<'a>,
}

impl<'a> CallbackContext<'a> {
    pub fn new(activity: &'a mut Activity, statics: &'a Statics<'a>) -> Self {
        Self { activity, statics }
    }

    fn evaluate(&self, expression: &Expression) -> Result<bool, EvalError> {
        self.statics.evaluator.evaluate_condition(
            expression,
            &self.activity.instances,
            self.statics.rules,
        )
    }

    // ── Tasks ────────────────────────────────────────────────────────

    fn task_started(&mut self, slot: TaskSlot, index: &mut ActivationIndex) {
        let activity = &mut *self.activity;
        let task = activity.activations.task_mut(slot);
        if task.in_loop {
            if task.first_iteration {
                task.first_iteration = false;
            } else {
                let fresh = activity.ids.next_id();
                let previous = std::mem::replace(&mut task.id, fresh.clone());
                let moved = index.relocate_task(&previous, &fresh);
                tracing::debug!(task = %task.name, previous = %previous, id = %fresh, moved, "Task re-entered");
            }
        }
        let task = activity.activations.task(slot);
        tracing::info!(task_id = %task.id, task = %task.name, "Task started");
        let event = LifecycleEvent::TaskStarted {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            constraints: task.constraints.clone(),
        };
        activity.active_tasks.insert(slot);
        activity.notify(event);
    }

    fn task_finished(&mut self, slot: TaskSlot) {
        let activity = &mut *self.activity;
        activity.active_tasks.remove(&slot);
        let stale: Vec<GateKey> = activity
            .pending_gates
            .iter()
            .filter(|g| g.task == slot)
            .copied()
            .collect();
        for gate in &stale {
            activity.clear_gate(gate);
        }

        let task = activity.activations.task(slot);
        tracing::info!(task_id = %task.id, task = %task.name, "Task finished");
        let event = LifecycleEvent::TaskFinished {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
        };
        activity.notify(event);

        if slot == self.statics.root && activity.active_tasks.is_empty() {
            activity.running = false;
            activity.finished = true;
            activity.stop_timers = true;
            tracing::info!("Process finished");
            activity.notify(LifecycleEvent::ProcessFinished);
        }
    }

    // ── Orders ───────────────────────────────────────────────────────

    fn order_started(&mut self, slot: OrderSlot, index: &mut ActivationIndex) {
        let activity = &mut *self.activity;
        let task_id = activity.task_id(activity.activations.order(slot).task);
        let order = activity.activations.order_mut(slot);
        if order.in_loop {
            if order.first_iteration {
                order.first_iteration = false;
            } else {
                order.id = activity.ids.next_id();
                let steps = order.steps.clone();
                for step in steps {
                    let fresh = activity.ids.next_id();
                    let activation = activity.activations.step_mut(step);
                    let previous = std::mem::replace(&mut activation.id, fresh.clone());
                    index.relocate_step(&task_id, &previous, &fresh);
                }
            }
        }

        let order = activity.activations.order(slot);
        tracing::info!(order_id = %order.id, task_id = %task_id, kind = %order.kind, "Order started");
        let event = LifecycleEvent::OrderStarted {
            order_id: order.id.clone(),
            task_id,
            kind: order.kind,
        };
        activity.active_orders.insert(slot);
        activity.notify(event);
    }

    fn order_finished(&mut self, slot: OrderSlot) {
        let activity = &mut *self.activity;
        activity.active_orders.remove(&slot);
        let order = activity.activations.order(slot);
        let task_id = activity.task_id(order.task);
        tracing::info!(order_id = %order.id, task_id = %task_id, "Order finished");
        let event = LifecycleEvent::OrderFinished {
            order_id: order.id.clone(),
            task_id,
            kind: order.kind,
        };
        activity.notify(event);
    }

    // ── Gates ────────────────────────────────────────────────────────

    /// Evaluate a gate on arrival; a false gate waits for instance updates
    fn gate_reached(
        &mut self,
        task: TaskSlot,
        step: Option<StepSlot>,
        phase: GatePhase,
    ) -> Result<Vec<WorkItem>, EngineError> {
        if let Some(step) = step {
            self.activity.active_steps.insert(step);
        }
        let gate = GateKey { task, step, phase };
        let Some(expression) = self.activity.gate_expression(&gate) else {
            return Ok(Vec::new());
        };
        let key = self.activity.gate_activation(&gate);
        if self.evaluate(&expression)? {
            tracing::debug!(activation = %key, phase = ?phase, "Gate open on arrival");
            let event = match phase {
                GatePhase::Start => NetEvent::started_by(key.task, key.step),
                GatePhase::Finish => NetEvent::finished_by(key.task, key.step),
            };
            return Ok(vec![WorkItem::Signal(event)]);
        }

        tracing::info!(activation = %key, phase = ?phase, gate = %expression, "Waiting for gate");
        let event = self.activity.gate_event(&gate);
        self.activity.expect(event);
        self.activity.pending_gates.insert(gate);
        let notification = match phase {
            GatePhase::Start => LifecycleEvent::StartGateWaiting {
                task_id: key.task,
                order_step_id: key.step,
                expression: expression.to_string(),
            },
            GatePhase::Finish => LifecycleEvent::FinishGateWaiting {
                task_id: key.task,
                order_step_id: key.step,
                expression: expression.to_string(),
            },
        };
        self.activity.notify(notification);
        Ok(Vec::new())
    }

    // ── Order steps ──────────────────────────────────────────────────

    fn waiting_for(&mut self, slot: StepSlot, status: StepStatus) {
        let activity = &mut *self.activity;
        activity.active_steps.insert(slot);
        let awaited = activity.step_event(slot, status);
        activity.expect(awaited);

        let step = activity.activations.step(slot);
        let task_id = activity.task_id(step.task);
        let event = match status {
            StepStatus::MovedToLocation => {
                tracing::info!(order_step_id = %step.id, step = %step.name, location = ?step.location, "Waiting for move");
                LifecycleEvent::WaitingForMove {
                    order_step_id: step.id.clone(),
                    task_id,
                    step_name: step.name.clone(),
                    location: step.location.clone(),
                }
            }
            StepStatus::ActionExecuted => {
                tracing::info!(order_step_id = %step.id, step = %step.name, "Waiting for action");
                LifecycleEvent::WaitingForAction {
                    order_step_id: step.id.clone(),
                    task_id,
                    step_name: step.name.clone(),
                    parameters: step.parameters.clone(),
                }
            }
        };
        activity.notify(event);
    }

    fn signal_received(&mut self, slot: StepSlot, status: StepStatus) {
        let activity = &mut *self.activity;
        let awaited = activity.step_event(slot, status);
        activity.forget(&awaited);

        let step = activity.activations.step(slot);
        let task_id = activity.task_id(step.task);
        tracing::info!(order_step_id = %step.id, status = %status, "Order step update applied");
        let event = match status {
            StepStatus::MovedToLocation => LifecycleEvent::MovedToLocation {
                order_step_id: step.id.clone(),
                task_id,
                location: step.location.clone(),
            },
            StepStatus::ActionExecuted => LifecycleEvent::ActionExecuted {
                order_step_id: step.id.clone(),
                task_id,
            },
        };
        activity.notify(event);
    }

    fn step_finished(&mut self, slot: StepSlot) {
        let activity = &mut *self.activity;
        activity.active_steps.remove(&slot);
        let stale: Vec<GateKey> = activity
            .pending_gates
            .iter()
            .filter(|g| g.step == Some(slot))
            .copied()
            .collect();
        for gate in &stale {
            activity.clear_gate(gate);
        }
        tracing::debug!(order_step_id = %activity.step_id(slot), "Order step finished");
    }

    // ── Control flow ─────────────────────────────────────────────────

    fn condition_reached(&mut self, slot: ConditionSlot) -> Result<Vec<WorkItem>, EngineError> {
        let condition = self.activity.activations.condition(slot).clone();
        let passed = self.evaluate(&condition.expression)?;
        tracing::debug!(condition = %condition.expression, passed, "Condition evaluated");
        let branch = if passed {
            condition.passed
        } else {
            condition.failed
        };
        Ok(vec![WorkItem::Token(branch)])
    }

    fn loop_check(&mut self, slot: LoopSlot) -> Result<Vec<WorkItem>, EngineError> {
        let l = self.activity.activations.loop_activation(slot).clone();
        let proceed = match &l.kind {
            LoopKind::While(expression) => self.evaluate(expression)?,
            LoopKind::Counting(limit) => {
                let limit = self.loop_limit(limit)?;
                let counter = self.activity.loop_counters.entry(slot).or_insert(0);
                if *counter < limit {
                    *counter += 1;
                    true
                } else {
                    *counter = 0;
                    false
                }
            }
        };
        tracing::debug!(loop_slot = slot.0, proceed, "Loop checked");
        Ok(vec![WorkItem::Token(if proceed { l.proceed } else { l.done })])
    }

    fn loop_limit(&self, limit: &Expression) -> Result<u64, EvalError> {
        let value = self.statics.evaluator.evaluate(
            limit,
            &self.activity.instances,
            self.statics.rules,
        )?;
        match value {
            Value::Number(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 => Ok(n as u64),
            other => Err(EvalError::InvalidLoopLimit(other.to_string())),
        }
    }
}

impl FireHandler for CallbackContext<'_> {
    type Error = EngineError;

    fn on_fire(
        &mut self,
        binding: &CallbackBinding,
        index: &mut ActivationIndex,
    ) -> Result<Vec<WorkItem>, EngineError> {
        match *binding {
            CallbackBinding::TaskStarted(slot) => self.task_started(slot, index),
            CallbackBinding::TaskFinished(slot) => self.task_finished(slot),
            CallbackBinding::OrderStarted(slot) => self.order_started(slot, index),
            CallbackBinding::OrderFinished(slot) => self.order_finished(slot),
            CallbackBinding::StartGateReached { task, step } => {
                return self.gate_reached(task, step, GatePhase::Start)
            }
            CallbackBinding::FinishGateReached { task, step } => {
                return self.gate_reached(task, step, GatePhase::Finish)
            }
            CallbackBinding::WaitingForMove(slot) => {
                self.waiting_for(slot, StepStatus::MovedToLocation)
            }
            CallbackBinding::WaitingForAction(slot) => {
                self.waiting_for(slot, StepStatus::ActionExecuted)
            }
            CallbackBinding::MovedToLocation(slot) => {
                self.signal_received(slot, StepStatus::MovedToLocation)
            }
            CallbackBinding::ActionExecuted(slot) => {
                self.signal_received(slot, StepStatus::ActionExecuted)
            }
            CallbackBinding::StepFinished(slot) => self.step_finished(slot),
            CallbackBinding::ConditionReached(slot) => return self.condition_reached(slot),
            CallbackBinding::LoopCheck(slot) => return self.loop_check(slot),
        }
        Ok(Vec::new())
    }
}
