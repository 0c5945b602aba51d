//! Property tests: transport barriers and loop id minting
//!
//! Whatever the number of pickup and delivery steps and whatever order the
//! confirmations arrive in, no delivery starts before the last pickup is
//! done and the run ends with a single token. Every loop iteration runs
//! under ids no earlier iteration used.

use materialflow_engine::{EngineConfig, EventLog, LifecycleEvent, Orchestrator};
use materialflow_net::StepRole;
use materialflow_types::{
    ActivationId, CountingLoop, Event, Expression, OrderStep, Process, Statement, StepStatus, Task,
};
use proptest::prelude::*;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn arb_step_count() -> impl Strategy<Value = usize> {
    1usize..6
}

fn transport_process(pickups: usize, deliveries: usize) -> Process {
    let pickup_names: Vec<String> = (0..pickups).map(|i| format!("pickup{}", i)).collect();
    let delivery_names: Vec<String> = (0..deliveries).map(|i| format!("deliver{}", i)).collect();
    let mut process = Process::new().with_task(
        Task::new("mainTask")
            .with_statement(Statement::transport(pickup_names.clone(), delivery_names.clone())),
    );
    for name in pickup_names.iter().chain(&delivery_names) {
        process = process.with_transport_step(OrderStep::new(name.as_str()).with_location("bay"));
    }
    process
}

fn loop_process(limit: usize) -> Process {
    Process::new()
        .with_action_step(OrderStep::new("stamp"))
        .with_task(Task::new("mainTask").with_statement(Statement::CountingLoop(CountingLoop {
            limit: Expression::literal(limit as f64),
            body: vec![Statement::call("inner")],
        })))
        .with_task(Task::new("inner").with_statement(Statement::action("stamp")))
}

fn complete_step(orchestrator: &mut Orchestrator, task: &ActivationId, step: &ActivationId) {
    for status in [StepStatus::MovedToLocation, StepStatus::ActionExecuted] {
        let event = Event::order_step_update(task, step, status);
        assert!(orchestrator.fire_event(&event).unwrap());
    }
}

fn delivery_active(orchestrator: &Orchestrator) -> bool {
    orchestrator
        .active_steps()
        .iter()
        .any(|s| s.role == StepRole::Delivery)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Deliveries wait for every pickup, in any completion order
    #[test]
    fn deliveries_wait_for_all_pickups(
        pickups in arb_step_count(),
        deliveries in arb_step_count(),
        reversed in any::<bool>(),
    ) {
        let process = transport_process(pickups, deliveries);
        let mut orchestrator = Orchestrator::new(&process, &EngineConfig::testing()).unwrap();
        orchestrator.start().unwrap();

        let task = orchestrator.active_tasks()[0].id.clone();
        let mut pickup_ids: Vec<ActivationId> = orchestrator
            .activations()
            .steps()
            .filter(|(_, s)| s.role == StepRole::Pickup)
            .map(|(_, s)| s.id.clone())
            .collect();
        if reversed {
            pickup_ids.reverse();
        }
        let delivery_ids: Vec<ActivationId> = orchestrator
            .activations()
            .steps()
            .filter(|(_, s)| s.role == StepRole::Delivery)
            .map(|(_, s)| s.id.clone())
            .collect();
        prop_assert_eq!(pickup_ids.len(), pickups);
        prop_assert_eq!(delivery_ids.len(), deliveries);

        for step in &pickup_ids {
            prop_assert!(!delivery_active(&orchestrator));
            complete_step(&mut orchestrator, &task, step);
        }
        prop_assert_eq!(orchestrator.active_steps().len(), deliveries);
        prop_assert!(orchestrator
            .active_steps()
            .iter()
            .all(|s| s.role == StepRole::Delivery));

        for step in &delivery_ids {
            prop_assert!(!orchestrator.is_finished());
            complete_step(&mut orchestrator, &task, step);
        }
        prop_assert!(orchestrator.is_finished());
        prop_assert_eq!(orchestrator.tokens(orchestrator.root().finished), 1);
        prop_assert_eq!(orchestrator.marking().total(), 1);
    }

    /// Each loop iteration runs under fresh task and step ids
    #[test]
    fn loop_iterations_never_reuse_ids(limit in 1usize..6) {
        let mut orchestrator = Orchestrator::new(&loop_process(limit), &EngineConfig::testing()).unwrap();
        let log = EventLog::new();
        orchestrator.add_listener(log.clone());
        orchestrator.start().unwrap();

        let mut seen_steps = HashSet::new();
        while let Some(event) = orchestrator.awaited_events().first().cloned() {
            let step = event.data["order_step_id"].as_str().unwrap().to_string();
            prop_assert!(seen_steps.insert(step));
            prop_assert!(orchestrator.fire_event(&event).unwrap());
            // the same confirmation is stale once the next iteration began
            prop_assert!(!orchestrator.fire_event(&event).unwrap());
        }
        prop_assert!(orchestrator.is_finished());
        prop_assert_eq!(seen_steps.len(), limit);

        let inner_ids: Vec<ActivationId> = log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::TaskStarted { task_id, task_name, .. } if task_name == "inner" => {
                    Some(task_id)
                }
                _ => None,
            })
            .collect();
        let unique: HashSet<&ActivationId> = inner_ids.iter().collect();
        prop_assert_eq!(inner_ids.len(), limit);
        prop_assert_eq!(unique.len(), limit);
    }
}
