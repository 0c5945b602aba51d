//! Orchestrator: drives one process run
//!
//! The orchestrator owns the compiled net, the run state, the evaluator and
//! the listeners. Every public operation is a transaction: the run state is
//! cloned first and restored when the operation fails, so an evaluation
//! error leaves marking, registries and instance values exactly as they
//! were and no listener hears about the failed attempt.

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::evaluator::{ExpressionEvaluator, StandardEvaluator};
use crate::lifecycle::{CallbackContext, Statics};
use crate::listener::{LifecycleEvent, LifecycleListener};
use crate::state::{Activity, GateKey, RunState};
use crate::store::{InstanceStore, RuleBook};
use crate::timers::{self, TimerFired, TimerSet, TimerState};
use chrono::Utc;
use materialflow_net::{
    ActivationTable, Marking, Net, NetBuilder, NetCompiler, NetEvent, PlaceId, RootPlaces,
    StepActivation, TaskActivation, TokenFlow,
};
use materialflow_types::{
    Attribute, Event, EventKind, Instance, Process, Value, TIME_STRUCT,
};
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Called with the net and the marking after every committed operation
pub type SnapshotHook = Box<dyn FnMut(&Net, &Marking) + Send>;

/// Drives one process run
pub struct Orchestrator {
    state: RunState,
    root: RootPlaces,
    rules: RuleBook,
    evaluator: Box<dyn ExpressionEvaluator>,
    listeners: Vec<Box<dyn LifecycleListener>>,
    snapshot_hook: Option<SnapshotHook>,
    timers: TimerSet,
    /// `(instance, timing)` of every `Time`-family instance
    timings: Vec<(String, String)>,
}

impl Orchestrator {
    /// Compile `process` with the standard builder and evaluator
    pub fn new(process: &Process, config: &EngineConfig) -> EngineResult<Self> {
        let builder = NetBuilder::new().with_id_strategy(config.ids);
        let evaluator = StandardEvaluator::with_max_depth(config.max_rule_depth);
        Self::with_components(process, config, &builder, Box::new(evaluator))
    }

    /// Compile `process` with the given compiler and evaluator
    pub fn with_components(
        process: &Process,
        config: &EngineConfig,
        compiler: &dyn NetCompiler,
        evaluator: Box<dyn ExpressionEvaluator>,
    ) -> EngineResult<Self> {
        let mut process = process.clone();
        process.normalize();
        let process = &process;
        let compiled = compiler.compile(process)?;
        let flow = TokenFlow::new(
            Arc::new(compiled.net),
            Arc::new(compiled.callbacks),
            compiled.index,
        )
        .with_max_steps(config.max_cascade_steps);

        let timings = process
            .instances_of(TIME_STRUCT)
            .into_iter()
            .filter_map(|instance| match instance.attribute("timing") {
                Some(Attribute::Primitive(Value::String(timing))) => {
                    Some((instance.name.clone(), timing.clone()))
                }
                _ => {
                    tracing::warn!(instance = %instance.name, "Time instance without timing");
                    None
                }
            })
            .collect();

        tracing::info!(
            places = flow.net().place_count(),
            transitions = flow.net().transition_count(),
            start_task = %process.start_task,
            "Orchestrator ready"
        );

        Ok(Self {
            state: RunState {
                flow,
                activity: Activity {
                    activations: compiled.activations,
                    instances: InstanceStore::from_process(process),
                    ids: compiled.ids,
                    ..Default::default()
                },
            },
            root: compiled.root,
            rules: RuleBook::from_process(process),
            evaluator,
            listeners: Vec::new(),
            snapshot_hook: None,
            timers: TimerSet::new(),
            timings,
        })
    }

    // ── Wiring ───────────────────────────────────────────────────────

    pub fn add_listener(&mut self, listener: impl LifecycleListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn set_snapshot_hook(&mut self, hook: impl FnMut(&Net, &Marking) + Send + 'static) {
        self.snapshot_hook = Some(Box::new(hook));
    }

    /// Channel on which armed timers report; must be set before [`start`](Self::start)
    pub fn set_timer_sender(&mut self, sender: mpsc::UnboundedSender<TimerFired>) {
        self.timers.set_sender(sender);
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Start the run: schedule timers, activate the root task, arm timers
    pub fn start(&mut self) -> EngineResult<()> {
        if self.state.activity.started_at.is_some() {
            return Err(EngineError::AlreadyStarted);
        }
        let now = Utc::now();
        let specs = self
            .timings
            .iter()
            .map(|(instance, timing)| timers::schedule(instance, timing, now))
            .collect::<EngineResult<Vec<_>>>()?;

        self.transact(|state, statics| {
            state.activity.started_at = Some(now);
            state.activity.running = true;
            tracing::info!("Process started");
            state.activity.notify(LifecycleEvent::ProcessStarted);
            let mut context = CallbackContext::new(&mut state.activity, statics);
            state.flow.settle(&mut context)?;
            Ok(())
        })?;

        if !self.state.activity.finished {
            self.timers.arm(specs);
        }
        Ok(())
    }

    /// Apply an external event
    ///
    /// Returns `Ok(false)` when the event is malformed, belongs to a
    /// service, or does not resolve to an activation that accepts it now.
    pub fn fire_event(&mut self, event: &Event) -> EngineResult<bool> {
        self.ensure_started()?;
        let kind = match event.kind() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(event = %event, error = %e, "Event ignored");
                return Ok(false);
            }
        };
        let net_event = match kind {
            EventKind::StartedBy { task, order_step } => NetEvent::started_by(task, order_step),
            EventKind::FinishedBy { task, order_step } => NetEvent::finished_by(task, order_step),
            EventKind::OrderStepUpdate {
                task,
                order_step,
                status,
            } => NetEvent::step_signal(task, order_step, status.into()),
            EventKind::InstanceUpdate {
                instance_name,
                new_values,
            } => return self.update_instance(&instance_name, &new_values),
            EventKind::Service { service_id, status } => {
                tracing::debug!(service = %service_id, status = %status, "Service status ignored");
                return Ok(false);
            }
        };
        self.transact(|state, statics| {
            let mut context = CallbackContext::new(&mut state.activity, statics);
            let applied = state.flow.apply_event(&net_event, &mut context)?;
            Ok(applied)
        })
    }

    /// Parse and apply an event in any of the accepted textual forms
    pub fn fire_raw(&mut self, raw: &str) -> EngineResult<bool> {
        self.ensure_started()?;
        match Event::parse_raw(raw) {
            Ok(event) => self.fire_event(&event),
            Err(e) => {
                tracing::debug!(error = %e, "Raw event ignored");
                Ok(false)
            }
        }
    }

    /// Overwrite attributes of an instance and re-evaluate waiting gates
    ///
    /// Returns `Ok(false)` for an unknown instance. Unknown attribute keys
    /// are skipped. Every pending gate that is now true fires its
    /// gate-satisfied event within this call.
    pub fn update_instance(&mut self, name: &str, values: &Map<String, Json>) -> EngineResult<bool> {
        if !self.state.activity.instances.contains(name) {
            tracing::debug!(instance = %name, "Update for unknown instance ignored");
            return Ok(false);
        }
        let name = name.to_string();
        let values = values.clone();
        self.transact(move |state, statics| {
            let activity = &mut state.activity;
            let mut written = Vec::new();
            for (key, value) in &values {
                let Some(attribute) = Attribute::from_json(value) else {
                    tracing::warn!(instance = %name, attribute = %key, "Unsupported attribute value skipped");
                    continue;
                };
                if activity.instances.set(&name, key, attribute) {
                    written.push(key.clone());
                } else {
                    tracing::warn!(instance = %name, attribute = %key, "Unknown attribute skipped");
                }
            }
            let elapsed = activity.elapsed_seconds();
            activity.instances.stamp_time(&name, elapsed);
            tracing::info!(instance = %name, attributes = ?written, "Instance updated");
            activity.notify(LifecycleEvent::InstanceUpdated {
                instance_name: name.clone(),
                attributes: written,
            });

            activity.prune_gates(state.flow.index());
            let pending: Vec<GateKey> = state.activity.pending_gates.iter().copied().collect();
            for gate in pending {
                if !state.activity.pending_gates.contains(&gate) {
                    continue;
                }
                let expression = state.activity.gate_expression(&gate);
                let open = match expression {
                    Some(expression) => statics.evaluator.evaluate_condition(
                        &expression,
                        &state.activity.instances,
                        statics.rules,
                    )?,
                    None => false,
                };
                if !open {
                    continue;
                }
                let key = state.activity.gate_activation(&gate);
                state.activity.clear_gate(&gate);
                tracing::debug!(activation = %key, phase = ?gate.phase, "Gate opened by update");
                let event = NetEvent::new(key, gate.phase.signal());
                let mut context = CallbackContext::new(&mut state.activity, statics);
                state.flow.apply_event(&event, &mut context)?;
            }
            Ok(true)
        })
    }

    /// Deliver an elapsed timer: sets the instance's `value` to `true`
    ///
    /// Cancelled and unknown timers are ignored.
    pub fn fire_timer(&mut self, instance: &str) -> EngineResult<bool> {
        self.ensure_started()?;
        match self.timers.state(instance) {
            Some(TimerState::Armed) | Some(TimerState::Fired) => {}
            state => {
                tracing::warn!(instance = %instance, state = ?state, "Timer delivery dropped");
                return Ok(false);
            }
        }
        let mut values = Map::new();
        values.insert("value".to_string(), Json::Bool(true));
        let applied = self.update_instance(instance, &values)?;
        if applied {
            self.timers.mark_fired(instance);
            tracing::info!(instance = %instance, "Timer fired");
        }
        Ok(applied)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_started(&self) -> bool {
        self.state.activity.started_at.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state.activity.running
    }

    pub fn is_finished(&self) -> bool {
        self.state.activity.finished
    }

    pub fn net(&self) -> &Net {
        self.state.flow.net()
    }

    pub fn marking(&self) -> &Marking {
        self.state.flow.marking()
    }

    pub fn tokens(&self, place: PlaceId) -> u32 {
        self.state.flow.tokens(place)
    }

    pub fn root(&self) -> RootPlaces {
        self.root
    }

    pub fn activations(&self) -> &ActivationTable {
        &self.state.activity.activations
    }

    /// External events the process currently waits for
    pub fn awaited_events(&self) -> &[Event] {
        &self.state.activity.awaited
    }

    pub fn active_tasks(&self) -> Vec<&TaskActivation> {
        let activity = &self.state.activity;
        activity
            .active_tasks
            .iter()
            .map(|slot| activity.activations.task(*slot))
            .collect()
    }

    pub fn active_steps(&self) -> Vec<&StepActivation> {
        let activity = &self.state.activity;
        activity
            .active_steps
            .iter()
            .map(|slot| activity.activations.step(*slot))
            .collect()
    }

    pub fn pending_gates(&self) -> usize {
        self.state.activity.pending_gates.len()
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.state.activity.instances.get(name)
    }

    pub fn instances(&self) -> &InstanceStore {
        &self.state.activity.instances
    }

    pub fn timer_state(&self, instance: &str) -> Option<TimerState> {
        self.timers.state(instance)
    }

    // ── Transactions ─────────────────────────────────────────────────

    fn ensure_started(&self) -> EngineResult<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(EngineError::NotStarted)
        }
    }

    fn transact<T>(
        &mut self,
        operation: impl FnOnce(&mut RunState, &Statics<'_>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let snapshot = self.state.clone();
        let statics = Statics {
            evaluator: self.evaluator.as_ref(),
            rules: &self.rules,
            root: self.root.task,
        };
        match operation(&mut self.state, &statics) {
            Ok(value) => {
                self.state.activity.prune_gates(self.state.flow.index());
                self.commit();
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Operation rolled back");
                self.state = snapshot;
                Err(e)
            }
        }
    }

    fn commit(&mut self) {
        let outbox = std::mem::take(&mut self.state.activity.outbox);
        for event in &outbox {
            for listener in &mut self.listeners {
                listener.on_event(event);
            }
        }
        if std::mem::take(&mut self.state.activity.stop_timers) {
            self.timers.cancel_all();
        }
        if let Some(hook) = self.snapshot_hook.as_mut() {
            hook(self.state.flow.net(), self.state.flow.marking());
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("running", &self.state.activity.running)
            .field("finished", &self.state.activity.finished)
            .field("tokens", &self.state.flow.marking().total())
            .field("listeners", &self.listeners.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}
