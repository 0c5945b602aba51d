//! Name lookup and structural validation of a process
//!
//! Every check appends to one error list so that a model with several
//! problems reports all of them in a single build.

use crate::errors::{BuildError, ConstructKind};
use materialflow_types::{
    Expression, OrderStep, Process, Rule, Statement, Task, EVENT_STRUCT, LOCATION_STRUCT,
    TIME_STRUCT,
};
use std::collections::{HashMap, HashSet};

/// Name-indexed view of a process
pub(crate) struct Catalog<'p> {
    pub tasks: HashMap<&'p str, &'p Task>,
    pub rules: HashMap<&'p str, &'p Rule>,
    pub structs: HashSet<&'p str>,
    pub transport_steps: HashMap<&'p str, &'p OrderStep>,
    pub move_steps: HashMap<&'p str, &'p OrderStep>,
    pub action_steps: HashMap<&'p str, &'p OrderStep>,
}

impl<'p> Catalog<'p> {
    /// Index every catalog, reporting each duplicate name
    pub fn index(process: &'p Process, errors: &mut Vec<BuildError>) -> Self {
        let mut structs = HashSet::new();
        for s in &process.structs {
            if !structs.insert(s.name.as_str()) {
                errors.push(duplicate(ConstructKind::Struct, &s.name));
            }
        }
        let mut instances = HashSet::new();
        for i in &process.instances {
            if !instances.insert(i.name.as_str()) {
                errors.push(duplicate(ConstructKind::Instance, &i.name));
            }
        }
        Self {
            tasks: index_named(&process.tasks, |t| &t.name, ConstructKind::Task, errors),
            rules: index_named(&process.rules, |r| &r.name, ConstructKind::Rule, errors),
            structs,
            transport_steps: index_named(
                &process.transport_steps,
                |s| &s.name,
                ConstructKind::TransportStep,
                errors,
            ),
            move_steps: index_named(
                &process.move_steps,
                |s| &s.name,
                ConstructKind::MoveStep,
                errors,
            ),
            action_steps: index_named(
                &process.action_steps,
                |s| &s.name,
                ConstructKind::ActionStep,
                errors,
            ),
        }
    }

    pub fn task(&self, name: &str, referrer: &str) -> Result<&'p Task, BuildError> {
        self.tasks
            .get(name)
            .copied()
            .ok_or_else(|| dangling(ConstructKind::Task, name, referrer))
    }

    pub fn step(
        &self,
        kind: ConstructKind,
        name: &str,
        referrer: &str,
    ) -> Result<&'p OrderStep, BuildError> {
        let catalog = match kind {
            ConstructKind::TransportStep => &self.transport_steps,
            ConstructKind::MoveStep => &self.move_steps,
            _ => &self.action_steps,
        };
        catalog
            .get(name)
            .copied()
            .ok_or_else(|| dangling(kind, name, referrer))
    }

    // ── Reference checks ─────────────────────────────────────────────

    /// Report dangling references, empty transports and recursive calls
    pub fn check(&self, process: &'p Process, errors: &mut Vec<BuildError>) {
        if !self.tasks.contains_key(process.start_task.as_str()) {
            errors.push(BuildError::MissingRootTask(process.start_task.clone()));
        }

        for instance in &process.instances {
            let name = instance.struct_name.as_str();
            let primitive = [LOCATION_STRUCT, EVENT_STRUCT, TIME_STRUCT].contains(&name);
            if !primitive && !self.structs.contains(name) {
                errors.push(dangling(
                    ConstructKind::Struct,
                    name,
                    &format!("instance '{}'", instance.name),
                ));
            }
        }

        for rule in &process.rules {
            let referrer = format!("rule '{}'", rule.name);
            for expression in &rule.expressions {
                self.check_expression(expression, &referrer, errors);
            }
            for default in rule.parameters.iter().filter_map(|p| p.default.as_ref()) {
                self.check_expression(default, &referrer, errors);
            }
        }

        for task in &process.tasks {
            let referrer = format!("task '{}'", task.name);
            for gate in task.started_by.iter().chain(task.finished_by.iter()) {
                self.check_expression(gate, &referrer, errors);
            }
            self.check_statements(&task.statements, &task.name, errors);
        }

        let steps = process
            .transport_steps
            .iter()
            .chain(&process.move_steps)
            .chain(&process.action_steps);
        for step in steps {
            let referrer = format!("order step '{}'", step.name);
            for gate in step.started_by.iter().chain(step.finished_by.iter()) {
                self.check_expression(gate, &referrer, errors);
            }
            if let Some(task) = &step.on_done {
                if !self.tasks.contains_key(task.as_str()) {
                    errors.push(dangling(ConstructKind::Task, task, &referrer));
                }
            }
        }

        self.check_recursion(process, errors);
    }

    fn check_statements(&self, statements: &[Statement], task: &str, errors: &mut Vec<BuildError>) {
        let referrer = format!("task '{}'", task);
        for statement in statements {
            match statement {
                Statement::Transport(order) => {
                    if order.pickups.is_empty() {
                        errors.push(BuildError::EmptyTransport {
                            task: task.to_string(),
                            missing: "pickup",
                        });
                    }
                    if order.deliveries.is_empty() {
                        errors.push(BuildError::EmptyTransport {
                            task: task.to_string(),
                            missing: "delivery",
                        });
                    }
                    for name in order.pickups.iter().chain(&order.deliveries) {
                        if let Err(e) = self.step(ConstructKind::TransportStep, name, &referrer) {
                            errors.push(e);
                        }
                    }
                }
                Statement::Move(order) => {
                    if let Err(e) = self.step(ConstructKind::MoveStep, &order.step, &referrer) {
                        errors.push(e);
                    }
                }
                Statement::Action(order) => {
                    if let Err(e) = self.step(ConstructKind::ActionStep, &order.step, &referrer) {
                        errors.push(e);
                    }
                }
                Statement::TaskCall(call) => {
                    if let Err(e) = self.task(&call.task, &referrer) {
                        errors.push(e);
                    }
                }
                Statement::Condition(condition) => {
                    self.check_expression(&condition.expression, &referrer, errors);
                    self.check_statements(&condition.passed, task, errors);
                    self.check_statements(&condition.failed, task, errors);
                }
                Statement::WhileLoop(l) => {
                    self.check_expression(&l.expression, &referrer, errors);
                    self.check_statements(&l.body, task, errors);
                }
                Statement::CountingLoop(l) => {
                    self.check_expression(&l.limit, &referrer, errors);
                    self.check_statements(&l.body, task, errors);
                }
            }
        }
    }

    fn check_expression(&self, expression: &Expression, referrer: &str, errors: &mut Vec<BuildError>) {
        for rule in expression.rule_names() {
            if !self.rules.contains_key(rule) {
                errors.push(dangling(ConstructKind::Rule, rule, referrer));
            }
        }
    }

    // ── Recursion ────────────────────────────────────────────────────

    fn check_recursion(&self, process: &'p Process, errors: &mut Vec<BuildError>) {
        let mut finished: HashSet<&str> = HashSet::new();
        for task in &process.tasks {
            let mut stack = Vec::new();
            self.visit(task, &mut stack, &mut finished, errors);
        }
    }

    fn visit(
        &self,
        task: &'p Task,
        stack: &mut Vec<&'p str>,
        finished: &mut HashSet<&'p str>,
        errors: &mut Vec<BuildError>,
    ) {
        if finished.contains(task.name.as_str()) {
            return;
        }
        if let Some(pos) = stack.iter().position(|n| *n == task.name) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|n| n.to_string()).collect();
            cycle.push(task.name.clone());
            errors.push(BuildError::RecursiveCall(cycle));
            return;
        }
        stack.push(&task.name);
        let mut callees = Vec::new();
        self.callees(&task.statements, &mut callees);
        for callee in callees {
            if let Some(next) = self.tasks.get(callee).copied() {
                self.visit(next, stack, finished, errors);
            }
        }
        stack.pop();
        finished.insert(&task.name);
    }

    /// Tasks entered from `statements`, follow-up tasks of order steps included
    fn callees(&self, statements: &'p [Statement], out: &mut Vec<&'p str>) {
        for statement in statements {
            match statement {
                Statement::TaskCall(call) => out.push(&call.task),
                Statement::Transport(order) => {
                    for name in order.pickups.iter().chain(&order.deliveries) {
                        self.follow_up(&self.transport_steps, name, out);
                    }
                }
                Statement::Move(order) => self.follow_up(&self.move_steps, &order.step, out),
                Statement::Action(order) => self.follow_up(&self.action_steps, &order.step, out),
                Statement::Condition(condition) => {
                    self.callees(&condition.passed, out);
                    self.callees(&condition.failed, out);
                }
                Statement::WhileLoop(l) => self.callees(&l.body, out),
                Statement::CountingLoop(l) => self.callees(&l.body, out),
            }
        }
    }

    fn follow_up(
        &self,
        catalog: &HashMap<&'p str, &'p OrderStep>,
        step: &str,
        out: &mut Vec<&'p str>,
    ) {
        if let Some(task) = catalog.get(step).copied().and_then(|s| s.on_done.as_deref()) {
            out.push(task);
        }
    }
}

fn index_named<'p, T>(
    items: &'p [T],
    name: impl Fn(&'p T) -> &'p String,
    kind: ConstructKind,
    errors: &mut Vec<BuildError>,
) -> HashMap<&'p str, &'p T> {
    let mut map = HashMap::new();
    for item in items {
        let key = name(item).as_str();
        if map.contains_key(key) {
            errors.push(duplicate(kind, key));
        } else {
            map.insert(key, item);
        }
    }
    map
}

fn duplicate(kind: ConstructKind, name: &str) -> BuildError {
    BuildError::Duplicate {
        kind,
        name: name.to_string(),
    }
}

fn dangling(kind: ConstructKind, name: &str, referrer: &str) -> BuildError {
    BuildError::Dangling {
        kind,
        name: name.to_string(),
        referrer: referrer.to_string(),
    }
}
