//! Graph builder: process model to token-flow net
//!
//! Every statement is compiled between two caller-supplied transitions: the
//! `entry` transition puts a token into the statement's first place and the
//! `exit` transition consumes the token(s) the statement produces when it is
//! done. Sequences chain statements through fresh connecting transitions.
//!
//! The builder validates the whole model first and returns every structural
//! problem at once. Compilation itself only starts from a clean model.

use crate::activation::{
    ActivationTable, ConditionActivation, LoopActivation, LoopKind, OrderActivation, OrderSlot,
    StepActivation, StepRole, TaskActivation, TaskSlot,
};
use crate::callbacks::{CallbackBinding, CallbackRegistry};
use crate::catalog::Catalog;
use crate::errors::{BuildError, BuildErrors, BuildResult, ConstructKind};
use crate::index::{ActivationIndex, ActivationKey, Signal};
use crate::net::{Net, PlaceId, TransitionId};
use materialflow_types::{
    Condition, IdGenerator, IdStrategy, OrderKind, OrderStep, Process, Statement, Task,
    TransportOrder,
};

/// Compiles a process into a net
pub trait NetCompiler {
    fn compile(&self, process: &Process) -> BuildResult<CompiledNet>;
}

/// The two ends of the compiled root task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootPlaces {
    /// Holds the single initial token
    pub started: PlaceId,
    /// Receives exactly one token when the whole process completed
    pub finished: PlaceId,
    pub task: TaskSlot,
}

/// Static artifacts of one compilation
#[derive(Clone, Debug)]
pub struct CompiledNet {
    pub net: Net,
    pub callbacks: CallbackRegistry,
    pub index: ActivationIndex,
    pub activations: ActivationTable,
    pub root: RootPlaces,
    /// Continues the id sequence used at build time
    pub ids: IdGenerator,
}

/// The standard [`NetCompiler`]
#[derive(Clone, Debug, Default)]
pub struct NetBuilder {
    ids: IdStrategy,
}

impl NetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_strategy(mut self, ids: IdStrategy) -> Self {
        self.ids = ids;
        self
    }

    /// Validate and compile `process`
    pub fn build(&self, process: &Process) -> BuildResult<CompiledNet> {
        let mut errors = Vec::new();
        let catalog = Catalog::index(process, &mut errors);
        catalog.check(process, &mut errors);
        if !errors.is_empty() {
            tracing::warn!(errors = errors.len(), "Process rejected by graph builder");
            return Err(BuildErrors(errors));
        }

        let mut compiler = Compiler {
            catalog,
            net: Net::new(),
            callbacks: CallbackRegistry::new(),
            index: ActivationIndex::new(),
            activations: ActivationTable::new(),
            ids: IdGenerator::new(self.ids),
        };
        let root = compiler.compile_root(&process.start_task)?;

        tracing::debug!(
            places = compiler.net.place_count(),
            transitions = compiler.net.transition_count(),
            tasks = compiler.activations.task_count(),
            steps = compiler.activations.step_count(),
            "Process compiled"
        );

        Ok(CompiledNet {
            net: compiler.net,
            callbacks: compiler.callbacks,
            index: compiler.index,
            activations: compiler.activations,
            root,
            ids: compiler.ids,
        })
    }
}

impl NetCompiler for NetBuilder {
    fn compile(&self, process: &Process) -> BuildResult<CompiledNet> {
        self.build(process)
    }
}

/// Where a statement is compiled
#[derive(Clone, Copy, Debug)]
struct Scope {
    task: TaskSlot,
    in_loop: bool,
}

struct Compiler<'p> {
    catalog: Catalog<'p>,
    net: Net,
    callbacks: CallbackRegistry,
    index: ActivationIndex,
    activations: ActivationTable,
    ids: IdGenerator,
}

impl<'p> Compiler<'p> {
    fn compile_root(&mut self, start_task: &str) -> Result<RootPlaces, BuildError> {
        let task = self
            .catalog
            .tasks
            .get(start_task)
            .copied()
            .ok_or_else(|| BuildError::MissingRootTask(start_task.to_string()))?;

        let started = self.net.add_place_with_tokens("process started", 1);
        let enter = self.net.add_transition("enter root task");
        self.net.add_input(started, enter);

        let root_slot = TaskSlot(self.activations.task_count());
        let finished = self.compile_task(task, enter, None, false)?;
        Ok(RootPlaces {
            started,
            finished,
            task: root_slot,
        })
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Compile one task activation entered through `entry`
    ///
    /// Returns the task's terminal place; the caller wires it onward.
    fn compile_task(
        &mut self,
        task: &'p Task,
        entry: TransitionId,
        parent: Option<TaskSlot>,
        in_loop: bool,
    ) -> Result<PlaceId, BuildError> {
        let id = self.ids.next_id();
        let finished = self.net.add_place(format!("{} finished", task.name));
        let slot = self.activations.push_task(TaskActivation {
            id: id.clone(),
            name: task.name.clone(),
            parent,
            in_loop,
            first_iteration: true,
            started_by: task.started_by.clone(),
            finished_by: task.finished_by.clone(),
            constraints: task.constraints.clone(),
            finished,
        });
        let key = ActivationKey::task(id);
        self.index.insert_key(key.clone());
        self.callbacks.register(entry, CallbackBinding::TaskStarted(slot));

        let body_entry = match task.started_by {
            Some(_) => {
                let guard = self.gate(entry, &key, Signal::StartGate, &task.name);
                self.callbacks.register(
                    entry,
                    CallbackBinding::StartGateReached {
                        task: slot,
                        step: None,
                    },
                );
                guard
            }
            None => entry,
        };

        let body_exit = self.net.add_transition(format!("{} body done", task.name));
        let scope = Scope {
            task: slot,
            in_loop,
        };
        self.compile_statements(&task.statements, body_entry, body_exit, scope)?;

        let exit = match task.finished_by {
            Some(_) => {
                let guard = self.gate(body_exit, &key, Signal::FinishGate, &task.name);
                self.callbacks.register(
                    body_exit,
                    CallbackBinding::FinishGateReached {
                        task: slot,
                        step: None,
                    },
                );
                guard
            }
            None => body_exit,
        };
        self.net.add_output(exit, finished);
        self.callbacks.register(exit, CallbackBinding::TaskFinished(slot));
        Ok(finished)
    }

    /// Waiting place after `from` plus a guard needing the satisfied place
    fn gate(
        &mut self,
        from: TransitionId,
        key: &ActivationKey,
        signal: Signal,
        label: &str,
    ) -> TransitionId {
        let (waiting_label, satisfied_label) = match signal {
            Signal::FinishGate => ("waiting for finish gate", "finish gate satisfied"),
            _ => ("waiting for start gate", "start gate satisfied"),
        };
        let waiting = self.net.add_place(format!("{}: {}", label, waiting_label));
        let satisfied = self.net.add_place(format!("{}: {}", label, satisfied_label));
        let guard = self.net.add_transition(format!("{}: {}", label, satisfied_label));
        self.net.add_output(from, waiting);
        self.net.add_input(waiting, guard);
        self.net.add_input(satisfied, guard);
        self.index.register(key.clone(), signal, satisfied);
        guard
    }

    // ── Statements ───────────────────────────────────────────────────

    fn compile_statements(
        &mut self,
        statements: &'p [Statement],
        entry: TransitionId,
        exit: TransitionId,
        scope: Scope,
    ) -> Result<(), BuildError> {
        if statements.is_empty() {
            let empty = self.net.add_place("empty sequence");
            self.net.add_output(entry, empty);
            self.net.add_input(empty, exit);
            return Ok(());
        }

        let mut current = entry;
        for (i, statement) in statements.iter().enumerate() {
            let next = if i + 1 == statements.len() {
                exit
            } else {
                self.net.add_transition("sequence")
            };
            self.compile_statement(statement, current, next, scope)?;
            current = next;
        }
        Ok(())
    }

    fn compile_statement(
        &mut self,
        statement: &'p Statement,
        entry: TransitionId,
        exit: TransitionId,
        scope: Scope,
    ) -> Result<(), BuildError> {
        let referrer = format!("task '{}'", self.activations.task(scope.task).name);
        match statement {
            Statement::TaskCall(call) => {
                let task = self.catalog.task(&call.task, &referrer)?;
                let finished = self.compile_task(task, entry, Some(scope.task), scope.in_loop)?;
                self.net.add_input(finished, exit);
                Ok(())
            }
            Statement::Transport(order) => self.compile_transport(order, entry, exit, scope),
            Statement::Move(order) => {
                let step = self
                    .catalog
                    .step(ConstructKind::MoveStep, &order.step, &referrer)?;
                self.compile_single(OrderKind::Move, step, entry, exit, scope)
            }
            Statement::Action(order) => {
                let step = self
                    .catalog
                    .step(ConstructKind::ActionStep, &order.step, &referrer)?;
                self.compile_single(OrderKind::Action, step, entry, exit, scope)
            }
            Statement::Condition(condition) => {
                self.compile_condition(condition, entry, exit, scope)
            }
            Statement::WhileLoop(l) => self.compile_loop(
                LoopKind::While(l.expression.clone()),
                &l.body,
                entry,
                exit,
                scope,
            ),
            Statement::CountingLoop(l) => self.compile_loop(
                LoopKind::Counting(l.limit.clone()),
                &l.body,
                entry,
                exit,
                scope,
            ),
        }
    }

    // ── Orders ───────────────────────────────────────────────────────

    fn open_order(
        &mut self,
        kind: OrderKind,
        entry: TransitionId,
        scope: Scope,
    ) -> (OrderSlot, TransitionId, PlaceId) {
        let finished = self.net.add_place(format!("{} order finished", kind));
        let order = self.activations.push_order(OrderActivation {
            id: self.ids.next_id(),
            kind,
            task: scope.task,
            steps: Vec::new(),
            in_loop: scope.in_loop,
            first_iteration: true,
            finished,
        });
        self.callbacks
            .register(entry, CallbackBinding::OrderStarted(order));
        let started = self.net.add_place(format!("{} order started", kind));
        let begin = self.net.add_transition(format!("{} order begin", kind));
        self.net.add_output(entry, started);
        self.net.add_input(started, begin);
        (order, begin, finished)
    }

    fn close_order(&mut self, order: OrderSlot, join: TransitionId, finished: PlaceId, exit: TransitionId) {
        self.callbacks
            .register(join, CallbackBinding::OrderFinished(order));
        self.net.add_output(join, finished);
        self.net.add_input(finished, exit);
    }

    /// Pickups in parallel, a synchronizing barrier, deliveries in parallel
    fn compile_transport(
        &mut self,
        order: &'p TransportOrder,
        entry: TransitionId,
        exit: TransitionId,
        scope: Scope,
    ) -> Result<(), BuildError> {
        let referrer = format!("task '{}'", self.activations.task(scope.task).name);
        let (slot, branch, finished) = self.open_order(OrderKind::Transport, entry, scope);
        let sync = self.net.add_transition("pickups synchronized");
        let join = self.net.add_transition("deliveries done");

        for name in &order.pickups {
            let step = self
                .catalog
                .step(ConstructKind::TransportStep, name, &referrer)?;
            self.compile_step(step, OrderKind::Transport, StepRole::Pickup, branch, sync, slot, scope)?;
        }
        for name in &order.deliveries {
            let step = self
                .catalog
                .step(ConstructKind::TransportStep, name, &referrer)?;
            self.compile_step(step, OrderKind::Transport, StepRole::Delivery, sync, join, slot, scope)?;
        }

        self.close_order(slot, join, finished, exit);
        Ok(())
    }

    fn compile_single(
        &mut self,
        kind: OrderKind,
        step: &'p OrderStep,
        entry: TransitionId,
        exit: TransitionId,
        scope: Scope,
    ) -> Result<(), BuildError> {
        let (slot, begin, finished) = self.open_order(kind, entry, scope);
        let join = self.net.add_transition(format!("{} order done", kind));
        self.compile_step(step, kind, StepRole::Single, begin, join, slot, scope)?;
        self.close_order(slot, join, finished, exit);
        Ok(())
    }

    // ── Order steps ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn compile_step(
        &mut self,
        def: &'p OrderStep,
        kind: OrderKind,
        role: StepRole,
        entry: TransitionId,
        exit: TransitionId,
        order: OrderSlot,
        scope: Scope,
    ) -> Result<(), BuildError> {
        let id = self.ids.next_id();
        let task_id = self.activations.task(scope.task).id.clone();
        let finished = self.net.add_place(format!("{} finished", def.name));
        let step = self.activations.push_step(StepActivation {
            id: id.clone(),
            name: def.name.clone(),
            kind,
            role,
            order,
            task: scope.task,
            location: def.location.clone(),
            parameters: def.parameters.clone(),
            started_by: def.started_by.clone(),
            finished_by: def.finished_by.clone(),
            finished,
        });
        let key = ActivationKey::step(task_id, id);
        self.index.insert_key(key.clone());

        let waiting = match kind {
            OrderKind::Action => CallbackBinding::WaitingForAction(step),
            _ => CallbackBinding::WaitingForMove(step),
        };
        let started = self.net.add_place(format!("{} started", def.name));
        match def.started_by {
            Some(_) => {
                let guard = self.gate(entry, &key, Signal::StartGate, &def.name);
                self.callbacks.register(
                    entry,
                    CallbackBinding::StartGateReached {
                        task: scope.task,
                        step: Some(step),
                    },
                );
                self.net.add_output(guard, started);
                self.callbacks.register(guard, waiting);
            }
            None => {
                self.net.add_output(entry, started);
                self.callbacks.register(entry, waiting);
            }
        }

        let last = match kind {
            OrderKind::Move => self.await_signal(
                started,
                &key,
                Signal::MovedToLocation,
                CallbackBinding::MovedToLocation(step),
                &def.name,
            ),
            OrderKind::Action => self.await_signal(
                started,
                &key,
                Signal::ActionExecuted,
                CallbackBinding::ActionExecuted(step),
                &def.name,
            ),
            OrderKind::Transport => {
                let moved = self.await_signal(
                    started,
                    &key,
                    Signal::MovedToLocation,
                    CallbackBinding::MovedToLocation(step),
                    &def.name,
                );
                let waiting_for_action = self
                    .net
                    .add_place(format!("{} waiting for action", def.name));
                self.net.add_output(moved, waiting_for_action);
                self.callbacks
                    .register(moved, CallbackBinding::WaitingForAction(step));
                self.await_signal(
                    waiting_for_action,
                    &key,
                    Signal::ActionExecuted,
                    CallbackBinding::ActionExecuted(step),
                    &def.name,
                )
            }
        };

        let last = match def.finished_by {
            Some(_) => {
                let guard = self.gate(last, &key, Signal::FinishGate, &def.name);
                self.callbacks.register(
                    last,
                    CallbackBinding::FinishGateReached {
                        task: scope.task,
                        step: Some(step),
                    },
                );
                guard
            }
            None => last,
        };
        self.net.add_output(last, finished);
        self.callbacks
            .register(last, CallbackBinding::StepFinished(step));

        match &def.on_done {
            Some(follow_up) => {
                let task = self
                    .catalog
                    .task(follow_up, &format!("order step '{}'", def.name))?;
                let start = self
                    .net
                    .add_transition(format!("{} follow-up", def.name));
                self.net.add_input(finished, start);
                let done = self.compile_task(task, start, Some(scope.task), scope.in_loop)?;
                self.net.add_input(done, exit);
            }
            None => self.net.add_input(finished, exit),
        }
        Ok(())
    }

    /// AND-join of `waiting` and an external signal place
    fn await_signal(
        &mut self,
        waiting: PlaceId,
        key: &ActivationKey,
        signal: Signal,
        binding: CallbackBinding,
        label: &str,
    ) -> TransitionId {
        let signal_label = match signal {
            Signal::MovedToLocation => "moved to location",
            _ => "action executed",
        };
        let place = self.net.add_place(format!("{}: {}", label, signal_label));
        let transition = self
            .net
            .add_transition(format!("{}: {}", label, signal_label));
        self.net.add_input(waiting, transition);
        self.net.add_input(place, transition);
        self.index.register(key.clone(), signal, place);
        self.callbacks.register(transition, binding);
        transition
    }

    // ── Control flow ─────────────────────────────────────────────────

    fn compile_condition(
        &mut self,
        condition: &'p Condition,
        entry: TransitionId,
        exit: TransitionId,
        scope: Scope,
    ) -> Result<(), BuildError> {
        let started = self.net.add_place("condition reached");
        let evaluate = self.net.add_transition("evaluate condition");
        let awaiting = self.net.add_place("awaiting condition");
        self.net.add_output(entry, started);
        self.net.add_input(started, evaluate);
        self.net.add_output(evaluate, awaiting);

        let passed = self.net.add_place("condition passed");
        let failed = self.net.add_place("condition failed");
        let slot = self.activations.push_condition(ConditionActivation {
            task: scope.task,
            expression: condition.expression.clone(),
            passed,
            failed,
        });
        self.callbacks
            .register(evaluate, CallbackBinding::ConditionReached(slot));

        let merged = self.net.add_place("condition done");
        let branches = [
            (passed, &condition.passed, "passed branch"),
            (failed, &condition.failed, "failed branch"),
        ];
        for (control, body, label) in branches {
            let branch = self.net.add_transition(label);
            let branch_done = self.net.add_transition(format!("{} done", label));
            self.net.add_input(awaiting, branch);
            self.net.add_input(control, branch);
            self.compile_statements(body, branch, branch_done, scope)?;
            self.net.add_output(branch_done, merged);
        }
        self.net.add_input(merged, exit);
        Ok(())
    }

    fn compile_loop(
        &mut self,
        kind: LoopKind,
        body: &'p [Statement],
        entry: TransitionId,
        exit: TransitionId,
        scope: Scope,
    ) -> Result<(), BuildError> {
        let check = self.net.add_place("loop check");
        let evaluate = self.net.add_transition("evaluate loop");
        let awaiting = self.net.add_place("awaiting loop decision");
        self.net.add_output(entry, check);
        self.net.add_input(check, evaluate);
        self.net.add_output(evaluate, awaiting);

        let proceed = self.net.add_place("loop continues");
        let done = self.net.add_place("loop done");
        let slot = self.activations.push_loop(LoopActivation {
            task: scope.task,
            kind,
            proceed,
            done,
        });
        self.callbacks
            .register(evaluate, CallbackBinding::LoopCheck(slot));

        let body_start = self.net.add_transition("loop body");
        let body_end = self.net.add_transition("loop body done");
        self.net.add_input(awaiting, body_start);
        self.net.add_input(proceed, body_start);
        let body_scope = Scope {
            in_loop: true,
            ..scope
        };
        self.compile_statements(body, body_start, body_end, body_scope)?;
        self.net.add_output(body_end, check);

        self.net.add_input(awaiting, exit);
        self.net.add_input(done, exit);
        Ok(())
    }
}
