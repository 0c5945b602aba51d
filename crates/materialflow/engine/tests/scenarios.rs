//! End-to-end runs of small process models through the orchestrator.

use materialflow_engine::{
    EngineConfig, EngineError, EvalError, EventLog, LifecycleEvent, Orchestrator,
    SchedulerService, TimerState,
};
use materialflow_net::{BuildError, RuntimeError, StepRole};
use materialflow_types::{
    ActivationId, Attribute, BinaryOp, Condition, CountingLoop, Event, Expression, Instance,
    OrderStep, Process, Rule, RuleCall, RuleParameter, Statement, StepStatus, Struct, Task,
    Value, WhileLoop,
};
use serde_json::{json, Map, Value as Json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id(s: &str) -> ActivationId {
    ActivationId::new(s)
}

fn values(value: Json) -> Map<String, Json> {
    value.as_object().cloned().unwrap_or_default()
}

fn start(process: &Process) -> (Orchestrator, EventLog) {
    let mut orchestrator = Orchestrator::new(process, &EngineConfig::testing()).unwrap();
    let log = EventLog::new();
    orchestrator.add_listener(log.clone());
    orchestrator.start().unwrap();
    (orchestrator, log)
}

/// Complete every order step the process currently waits for
fn complete_awaited(orchestrator: &mut Orchestrator) {
    while let Some(event) = orchestrator
        .awaited_events()
        .iter()
        .find(|e| e.event_type == "order_step_update")
        .cloned()
    {
        assert!(orchestrator.fire_event(&event).unwrap());
    }
}

fn step_update(order_step: &str, task: &str, status: StepStatus) -> Event {
    Event::order_step_update(&id(task), &id(order_step), status)
}

fn transport_process() -> Process {
    Process::new()
        .with_instance(Instance::new("shelf", "Location"))
        .with_instance(Instance::new("dock", "Location"))
        .with_transport_step(OrderStep::new("pickupGoods").with_location("shelf"))
        .with_transport_step(OrderStep::new("deliverGoods").with_location("dock"))
        .with_transport_step(OrderStep::new("pickupEmpties").with_location("dock"))
        .with_transport_step(OrderStep::new("returnEmpties").with_location("shelf"))
        .with_task(
            Task::new("mainTask")
                .with_statement(Statement::transport(["pickupGoods"], ["deliverGoods"]))
                .with_statement(Statement::transport(["pickupEmpties"], ["returnEmpties"])),
        )
}

// ---------------------------------------------------------------------------
// Transport orders
// ---------------------------------------------------------------------------

#[test]
fn test_two_transports_end_with_one_token() {
    let process = transport_process();
    let (mut orchestrator, log) = start(&process);

    // task 0, order 1, steps 2 and 3; order 4, steps 5 and 6
    for (step, status) in [
        ("2", StepStatus::MovedToLocation),
        ("2", StepStatus::ActionExecuted),
        ("3", StepStatus::MovedToLocation),
        ("3", StepStatus::ActionExecuted),
        ("5", StepStatus::MovedToLocation),
        ("5", StepStatus::ActionExecuted),
        ("6", StepStatus::MovedToLocation),
        ("6", StepStatus::ActionExecuted),
    ] {
        assert!(orchestrator.fire_event(&step_update(step, "0", status)).unwrap());
    }

    let root = orchestrator.root();
    assert_eq!(orchestrator.tokens(root.finished), 1);
    assert_eq!(orchestrator.marking().total(), 1);
    assert!(orchestrator.is_finished());
    assert!(!orchestrator.is_running());
    assert!(orchestrator.awaited_events().is_empty());

    let names = log.names();
    assert_eq!(names.first(), Some(&"process_started"));
    assert_eq!(names.last(), Some(&"process_finished"));
    assert_eq!(names.iter().filter(|n| **n == "order_finished").count(), 2);
}

#[test]
fn test_waiting_for_action_follows_move() {
    let process = transport_process();
    let (mut orchestrator, log) = start(&process);

    assert_eq!(
        orchestrator.awaited_events(),
        &[step_update("2", "0", StepStatus::MovedToLocation)]
    );
    orchestrator
        .fire_event(&step_update("2", "0", StepStatus::MovedToLocation))
        .unwrap();
    assert_eq!(
        orchestrator.awaited_events(),
        &[step_update("2", "0", StepStatus::ActionExecuted)]
    );
    assert_eq!(
        log.names(),
        vec![
            "process_started",
            "task_started",
            "order_started",
            "waiting_for_move",
            "moved_to_location",
            "waiting_for_action",
        ]
    );
}

#[test]
fn test_repeated_move_is_idempotent() {
    let process = transport_process();
    let (mut orchestrator, log) = start(&process);
    let moved = step_update("2", "0", StepStatus::MovedToLocation);

    assert!(orchestrator.fire_event(&moved).unwrap());
    let marking = orchestrator.marking().clone();
    let notifications = log.events().len();

    assert!(!orchestrator.fire_event(&moved).unwrap());
    assert_eq!(orchestrator.marking(), &marking);
    assert_eq!(log.events().len(), notifications);
}

#[test]
fn test_unknown_activation_rejected() {
    let process = transport_process();
    let (mut orchestrator, _) = start(&process);
    let marking = orchestrator.marking().clone();
    assert!(!orchestrator
        .fire_event(&step_update("99", "0", StepStatus::MovedToLocation))
        .unwrap());
    assert!(!orchestrator
        .fire_event(&step_update("2", "7", StepStatus::MovedToLocation))
        .unwrap());
    assert_eq!(orchestrator.marking(), &marking);
}

#[test]
fn test_step_update_before_step_starts_is_kept() {
    let process = transport_process();
    let (mut orchestrator, _) = start(&process);

    // delivery step 3 has not started; its move is parked until it does
    assert!(orchestrator
        .fire_event(&step_update("3", "0", StepStatus::MovedToLocation))
        .unwrap());
    orchestrator
        .fire_event(&step_update("2", "0", StepStatus::MovedToLocation))
        .unwrap();
    orchestrator
        .fire_event(&step_update("2", "0", StepStatus::ActionExecuted))
        .unwrap();

    assert_eq!(
        orchestrator.awaited_events(),
        &[step_update("3", "0", StepStatus::ActionExecuted)]
    );
}

#[test]
fn test_pickup_barrier_holds_deliveries() {
    let process = Process::new()
        .with_transport_step(OrderStep::new("a").with_location("l1"))
        .with_transport_step(OrderStep::new("b").with_location("l2"))
        .with_transport_step(OrderStep::new("c").with_location("l3"))
        .with_task(Task::new("mainTask").with_statement(Statement::transport(["a", "b"], ["c"])));
    let (mut orchestrator, _) = start(&process);

    let ids: Vec<(StepRole, String)> = orchestrator
        .activations()
        .steps()
        .map(|(_, s)| (s.role, s.id.to_string()))
        .collect();
    let pickups: Vec<&String> = ids
        .iter()
        .filter(|(role, _)| *role == StepRole::Pickup)
        .map(|(_, id)| id)
        .collect();
    assert_eq!(pickups.len(), 2);

    for status in [StepStatus::MovedToLocation, StepStatus::ActionExecuted] {
        orchestrator
            .fire_event(&step_update(pickups[0], "0", status))
            .unwrap();
    }
    let delivering = orchestrator
        .active_steps()
        .iter()
        .any(|s| s.role == StepRole::Delivery);
    assert!(!delivering);

    for status in [StepStatus::MovedToLocation, StepStatus::ActionExecuted] {
        orchestrator
            .fire_event(&step_update(pickups[1], "0", status))
            .unwrap();
    }
    let active: Vec<String> = orchestrator
        .active_steps()
        .iter()
        .map(|s| s.name.clone())
        .collect();
    assert_eq!(active, vec!["c".to_string()]);
}

// ---------------------------------------------------------------------------
// Gates and instance updates
// ---------------------------------------------------------------------------

fn gated_process() -> Process {
    Process::new()
        .with_instance(Instance::new("door", "Event").with_attribute("value", Attribute::primitive(false)))
        .with_move_step(OrderStep::new("enterHall").with_location("hall"))
        .with_task(
            Task::new("mainTask")
                .with_started_by(Expression::dotted("door.value"))
                .with_statement(Statement::move_to("enterHall")),
        )
}

#[test]
fn test_gate_opens_on_instance_update() {
    let (mut orchestrator, log) = start(&gated_process());
    assert_eq!(orchestrator.pending_gates(), 1);
    assert_eq!(
        orchestrator.awaited_events(),
        &[Event::started_by(&id("0"), None)]
    );
    assert!(log.names().contains(&"start_gate_waiting"));

    let updated = orchestrator
        .update_instance("door", &values(json!({"value": true})))
        .unwrap();
    assert!(updated);
    assert_eq!(orchestrator.pending_gates(), 0);
    assert_eq!(
        orchestrator.awaited_events(),
        &[step_update("2", "0", StepStatus::MovedToLocation)]
    );
    assert_eq!(
        orchestrator.instance("door").unwrap().attribute("value"),
        Some(&Attribute::primitive(true))
    );
}

#[test]
fn test_gate_opens_on_external_event() {
    let (mut orchestrator, _) = start(&gated_process());
    assert!(orchestrator
        .fire_event(&Event::started_by(&id("0"), None))
        .unwrap());
    assert_eq!(orchestrator.pending_gates(), 0);
    assert_eq!(orchestrator.active_steps().len(), 1);

    // consumed: the same gate event is rejected
    assert!(!orchestrator
        .fire_event(&Event::started_by(&id("0"), None))
        .unwrap());
}

#[test]
fn test_update_of_unknown_instance_or_attribute() {
    let (mut orchestrator, _) = start(&gated_process());
    assert!(!orchestrator
        .update_instance("window", &values(json!({"value": true})))
        .unwrap());

    assert!(orchestrator
        .update_instance("door", &values(json!({"colour": "red"})))
        .unwrap());
    assert!(orchestrator.instance("door").unwrap().attribute("colour").is_none());
    assert_eq!(orchestrator.pending_gates(), 1);
}

#[test]
fn test_instance_update_event_routes_to_update() {
    let (mut orchestrator, _) = start(&gated_process());
    let event = Event::instance_update("door", values(json!({"value": true})));
    assert!(orchestrator.fire_event(&event).unwrap());
    assert_eq!(orchestrator.pending_gates(), 0);
}

#[test]
fn test_weight_gate_advances_within_update() {
    let process = Process::new()
        .with_struct(Struct::new("Pallet").with_attribute("weight", "number"))
        .with_instance(
            Instance::new("pallet", "Pallet").with_attribute("weight", Attribute::primitive(0.0)),
        )
        .with_move_step(OrderStep::new("toScale").with_location("scale"))
        .with_task(
            Task::new("mainTask")
                .with_started_by(Expression::binary(
                    BinaryOp::Gt,
                    Expression::dotted("pallet.weight"),
                    Expression::literal(50.0),
                ))
                .with_statement(Statement::move_to("toScale")),
        );
    let (mut orchestrator, _) = start(&process);

    assert!(orchestrator
        .update_instance("pallet", &values(json!({"weight": 10})))
        .unwrap());
    assert_eq!(orchestrator.pending_gates(), 1);
    assert!(orchestrator.active_steps().is_empty());

    assert!(orchestrator
        .update_instance("pallet", &values(json!({"weight": 60})))
        .unwrap());
    assert_eq!(orchestrator.pending_gates(), 0);
    assert_eq!(waiting_step(&orchestrator), vec!["toScale".to_string()]);
}

#[test]
fn test_json_model_gets_implicit_attributes() {
    let process: Process = serde_json::from_value(json!({
        "structs": [{"name": "Pallet", "attributes": {"weight": "number"}}],
        "instances": [{
            "name": "pallet",
            "struct_name": "Pallet",
            "attributes": {"weight": {"kind": "primitive", "value": 0}}
        }],
        "move_steps": [{"name": "toScale", "location": "scale"}],
        "tasks": [{
            "name": "mainTask",
            "started_by": {
                "kind": "binary",
                "op": "eq",
                "left": {"kind": "attribute_path", "path": ["pallet", "id"]},
                "right": {"kind": "literal", "value": "pallet"}
            },
            "statements": [{"kind": "move", "step": "toScale"}]
        }]
    }))
    .unwrap();
    let (mut orchestrator, _) = start(&process);

    // the id gate resolves without an explicit id attribute
    assert_eq!(orchestrator.pending_gates(), 0);
    assert_eq!(waiting_step(&orchestrator), vec!["toScale".to_string()]);
    assert_eq!(
        orchestrator.instance("pallet").unwrap().attribute("time"),
        Some(&Attribute::primitive(0.0))
    );

    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(orchestrator
        .update_instance("pallet", &values(json!({"weight": 2})))
        .unwrap());
    let pallet = orchestrator.instance("pallet").unwrap();
    assert_eq!(pallet.attribute("weight"), Some(&Attribute::primitive(2.0)));
    match pallet.attribute("time") {
        Some(Attribute::Primitive(Value::Number(t))) => assert!(*t > 0.0),
        other => panic!("time not stamped: {:?}", other),
    }
}

#[test]
fn test_type_mismatch_rolls_back() {
    let process = Process::new()
        .with_instance(
            Instance::new("pallet", "Pallet").with_attribute("weight", Attribute::primitive(5.0)),
        )
        .with_struct(Struct::new("Pallet").with_attribute("weight", "number"))
        .with_task(Task::new("mainTask").with_started_by(Expression::binary(
            BinaryOp::Gt,
            Expression::dotted("pallet.weight"),
            Expression::literal(10.0),
        )));
    let (mut orchestrator, log) = start(&process);
    let marking = orchestrator.marking().clone();
    let notifications = log.events().len();

    let err = orchestrator
        .update_instance("pallet", &values(json!({"weight": "heavy"})))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Evaluation(EvalError::TypeMismatch { .. })
    ));

    assert_eq!(
        orchestrator.instance("pallet").unwrap().attribute("weight"),
        Some(&Attribute::primitive(5.0))
    );
    assert_eq!(orchestrator.marking(), &marking);
    assert_eq!(orchestrator.pending_gates(), 1);
    assert_eq!(log.events().len(), notifications);

    // the run is still usable
    assert!(orchestrator
        .update_instance("pallet", &values(json!({"weight": 12.0})))
        .unwrap());
    assert!(orchestrator.is_finished());
}

#[test]
fn test_finish_gate_on_step() {
    let process = Process::new()
        .with_instance(Instance::new("qa", "Event").with_attribute("value", Attribute::primitive(false)))
        .with_action_step(OrderStep::new("inspect").with_finished_by(Expression::dotted("qa.value")))
        .with_task(Task::new("mainTask").with_statement(Statement::action("inspect")));
    let (mut orchestrator, log) = start(&process);

    orchestrator
        .fire_event(&step_update("2", "0", StepStatus::ActionExecuted))
        .unwrap();
    assert!(log.names().contains(&"finish_gate_waiting"));
    assert_eq!(
        orchestrator.awaited_events(),
        &[Event::finished_by(&id("0"), Some(&id("2")))]
    );
    assert!(!orchestrator.is_finished());

    orchestrator
        .update_instance("qa", &values(json!({"value": true})))
        .unwrap();
    assert!(orchestrator.is_finished());
    assert!(orchestrator.active_steps().is_empty());
}

// ---------------------------------------------------------------------------
// Follow-up tasks
// ---------------------------------------------------------------------------

#[test]
fn test_follow_up_runs_before_order_finishes() {
    let process = Process::new()
        .with_move_step(OrderStep::new("goto").with_location("bay").with_on_done("cleanup"))
        .with_action_step(OrderStep::new("wipe"))
        .with_task(Task::new("mainTask").with_statement(Statement::move_to("goto")))
        .with_task(Task::new("cleanup").with_statement(Statement::action("wipe")));
    let (mut orchestrator, log) = start(&process);

    // main 0, move order 1, goto 2, cleanup 3, action order 4, wipe 5
    assert!(orchestrator.fire_raw("2,0,moved_to_location").unwrap());
    assert!(orchestrator.fire_raw("5,3,action_executed").unwrap());
    assert!(orchestrator.is_finished());

    let order: Vec<String> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            LifecycleEvent::TaskStarted { task_name, .. } => Some(format!("start {}", task_name)),
            LifecycleEvent::TaskFinished { task_name, .. } => Some(format!("finish {}", task_name)),
            LifecycleEvent::OrderFinished { kind, .. } => Some(format!("order {}", kind)),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            "start mainTask",
            "start cleanup",
            "order action",
            "finish cleanup",
            "order move",
            "finish mainTask",
        ]
    );
}

// ---------------------------------------------------------------------------
// Rules, conditions and loops
// ---------------------------------------------------------------------------

fn rule_process(call: RuleCall) -> Process {
    Process::new()
        .with_instance(
            Instance::new("pallet", "Pallet").with_attribute("weight", Attribute::primitive(100.0)),
        )
        .with_struct(Struct::new("Pallet").with_attribute("weight", "number"))
        .with_rule(
            Rule::new("isHeavy")
                .with_parameter(RuleParameter::with_default(
                    "weight",
                    Expression::dotted("pallet.weight"),
                ))
                .with_expression(Expression::binary(
                    BinaryOp::Gt,
                    Expression::dotted("weight"),
                    Expression::literal(50.0),
                )),
        )
        .with_move_step(OrderStep::new("heavyLane").with_location("lane1"))
        .with_move_step(OrderStep::new("lightLane").with_location("lane2"))
        .with_task(Task::new("mainTask").with_statement(Statement::Condition(Condition {
            expression: Expression::call(call),
            passed: vec![Statement::move_to("heavyLane")],
            failed: vec![Statement::move_to("lightLane")],
        })))
}

fn waiting_step(orchestrator: &Orchestrator) -> Vec<String> {
    orchestrator
        .active_steps()
        .iter()
        .map(|s| s.name.clone())
        .collect()
}

#[test]
fn test_rule_default_selects_heavy_branch() {
    let (orchestrator, _) = start(&rule_process(RuleCall::new("isHeavy")));
    assert_eq!(waiting_step(&orchestrator), vec!["heavyLane".to_string()]);
}

#[test]
fn test_rule_keyword_overrides_default() {
    let call = RuleCall::new("isHeavy").kwarg("weight", Expression::literal(10.0));
    let (orchestrator, _) = start(&rule_process(call));
    assert_eq!(waiting_step(&orchestrator), vec!["lightLane".to_string()]);
}

#[test]
fn test_condition_branch_completes_process() {
    let (mut orchestrator, _) = start(&rule_process(RuleCall::new("isHeavy")));
    complete_awaited(&mut orchestrator);
    assert!(orchestrator.is_finished());
    assert_eq!(orchestrator.marking().total(), 1);
}

#[test]
fn test_loop_iterations_get_fresh_ids() {
    let process = Process::new()
        .with_action_step(OrderStep::new("weld"))
        .with_task(Task::new("mainTask").with_statement(Statement::CountingLoop(CountingLoop {
            limit: Expression::literal(3.0),
            body: vec![Statement::call("inner")],
        })))
        .with_task(Task::new("inner").with_statement(Statement::action("weld")));
    let (mut orchestrator, log) = start(&process);

    // first iteration keeps the build-time ids
    assert_eq!(
        orchestrator.awaited_events(),
        &[step_update("3", "1", StepStatus::ActionExecuted)]
    );
    assert!(orchestrator.fire_raw("3,1,action_executed").unwrap());
    assert!(!orchestrator.fire_raw("3,1,action_executed").unwrap());
    complete_awaited(&mut orchestrator);
    assert!(orchestrator.is_finished());

    let inner_ids: Vec<ActivationId> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            LifecycleEvent::TaskStarted {
                task_id, task_name, ..
            } if task_name == "inner" => Some(task_id),
            _ => None,
        })
        .collect();
    assert_eq!(inner_ids.len(), 3);
    let mut unique = inner_ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_while_loop_exits_when_false() {
    let process = Process::new()
        .with_instance(Instance::new("more", "Event").with_attribute("value", Attribute::primitive(true)))
        .with_move_step(OrderStep::new("fetch").with_location("store"))
        .with_task(Task::new("mainTask").with_statement(Statement::WhileLoop(
            WhileLoop {
                expression: Expression::dotted("more.value"),
                body: vec![Statement::move_to("fetch")],
            },
        )));
    let (mut orchestrator, _) = start(&process);

    let first = orchestrator.awaited_events()[0].clone();
    assert!(orchestrator.fire_event(&first).unwrap());
    assert!(!orchestrator.is_finished());
    let second = orchestrator.awaited_events()[0].clone();
    assert_ne!(first, second);

    orchestrator
        .update_instance("more", &values(json!({"value": false})))
        .unwrap();
    assert!(orchestrator.fire_event(&second).unwrap());
    assert!(orchestrator.is_finished());
}

#[test]
fn test_invalid_loop_limit_fails_start() {
    let process = Process::new().with_task(Task::new("mainTask").with_statement(
        Statement::CountingLoop(CountingLoop {
            limit: Expression::literal(2.5),
            body: Vec::new(),
        }),
    ));
    let mut orchestrator = Orchestrator::new(&process, &EngineConfig::testing()).unwrap();
    let err = orchestrator.start().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Evaluation(EvalError::InvalidLoopLimit(_))
    ));
    assert!(!orchestrator.is_started());
}

#[test]
fn test_endless_while_loop_hits_cascade_limit() {
    let process = Process::new().with_task(Task::new("mainTask").with_statement(
        Statement::WhileLoop(WhileLoop {
            expression: Expression::literal(true),
            body: Vec::new(),
        }),
    ));
    let config = EngineConfig {
        max_cascade_steps: 200,
        ..EngineConfig::testing()
    };
    let mut orchestrator = Orchestrator::new(&process, &config).unwrap();
    let log = EventLog::new();
    orchestrator.add_listener(log.clone());
    let before = orchestrator.marking().clone();

    let err = orchestrator.start().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Runtime(RuntimeError::CascadeLimit { limit: 200 })
    ));
    assert_eq!(orchestrator.marking(), &before);
    assert!(!orchestrator.is_started());
    assert!(log.names().is_empty());
}

// ---------------------------------------------------------------------------
// Raw input, lifecycle errors, hooks
// ---------------------------------------------------------------------------

#[test]
fn test_raw_forms() {
    let (mut orchestrator, _) = start(&gated_process());
    assert!(!orchestrator.fire_raw("agv-7,charging").unwrap());
    assert!(!orchestrator.fire_raw("not an event").unwrap());
    assert!(!orchestrator.fire_raw("2,0,teleported").unwrap());

    let update = r#"{"type": "instance_update", "data": {"instance_name": "door", "new_values": {"value": true}}}"#;
    assert!(orchestrator.fire_raw(update).unwrap());
    assert!(orchestrator.fire_raw("2,0,moved_to_location").unwrap());
    assert!(orchestrator.is_finished());
}

#[test]
fn test_operations_require_start() {
    let mut orchestrator = Orchestrator::new(&gated_process(), &EngineConfig::testing()).unwrap();
    assert!(matches!(
        orchestrator.fire_raw("2,0,moved_to_location"),
        Err(EngineError::NotStarted)
    ));
    orchestrator.start().unwrap();
    assert!(matches!(orchestrator.start(), Err(EngineError::AlreadyStarted)));
}

#[test]
fn test_build_errors_surface() {
    let process = Process::new().with_task(Task::new("mainTask").with_statement(Statement::call("ghost")));
    let err = Orchestrator::new(&process, &EngineConfig::testing()).unwrap_err();
    match err {
        EngineError::Build(errors) => assert!(errors
            .iter()
            .any(|e| matches!(e, BuildError::Dangling { name, .. } if name == "ghost"))),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_snapshot_hook_called_per_commit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = Orchestrator::new(&transport_process(), &EngineConfig::testing()).unwrap();
    let counter = calls.clone();
    orchestrator.set_snapshot_hook(move |net, marking| {
        assert!(net.place_count() > 0);
        assert!(marking.total() > 0);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    orchestrator.start().unwrap();
    orchestrator
        .fire_event(&step_update("2", "0", StepStatus::MovedToLocation))
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_uuid_ids_are_unique() {
    let mut orchestrator = Orchestrator::new(&transport_process(), &EngineConfig::default()).unwrap();
    orchestrator.start().unwrap();
    let mut ids: Vec<ActivationId> = orchestrator
        .activations()
        .steps()
        .map(|(_, s)| s.id.clone())
        .collect();
    ids.extend(orchestrator.activations().tasks().map(|(_, t)| t.id.clone()));
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
    complete_awaited(&mut orchestrator);
    assert!(orchestrator.is_finished());
}

// ---------------------------------------------------------------------------
// Scheduler service and timers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_timer_opens_gate_through_service() {
    let process = Process::new()
        .with_instance(
            Instance::new("shiftStart", "Time")
                .with_attribute("timing", Attribute::primitive("* * * * *"))
                .with_attribute("value", Attribute::primitive(false)),
        )
        .with_task(Task::new("mainTask").with_started_by(Expression::dotted("shiftStart.value")));
    let orchestrator = Orchestrator::new(&process, &EngineConfig::testing()).unwrap();
    let handle = SchedulerService::spawn(orchestrator).unwrap();

    let first = handle.snapshot().await.unwrap();
    assert!(first.running);
    assert_eq!(first.awaited, vec![Event::started_by(&id("0"), None)]);

    let mut finished = false;
    for _ in 0..120 {
        if handle.snapshot().await.unwrap().finished {
            finished = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
    assert!(finished);

    let orchestrator = handle.shutdown().await.unwrap();
    assert_eq!(
        orchestrator.instance("shiftStart").unwrap().attribute("value"),
        Some(&Attribute::primitive(true))
    );
}

#[test]
fn test_malformed_timing_fails_start() {
    let process = transport_process().with_instance(
        Instance::new("shiftStart", "Time").with_attribute("timing", Attribute::primitive("every monday")),
    );
    let mut orchestrator = Orchestrator::new(&process, &EngineConfig::testing()).unwrap();
    let err = orchestrator.start().unwrap_err();
    match err {
        EngineError::TimerScheduling { instance, .. } => assert_eq!(instance, "shiftStart"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(!orchestrator.is_started());
    assert!(orchestrator.active_tasks().is_empty());
    assert_eq!(orchestrator.timer_state("shiftStart"), None);
}

#[test]
fn test_timers_cancelled_when_process_finishes() {
    let process = transport_process().with_instance(
        Instance::new("newYear", "Time")
            .with_attribute("timing", Attribute::primitive("0 0 1 1 *"))
            .with_attribute("value", Attribute::primitive(false)),
    );
    let (mut orchestrator, _) = start(&process);
    assert_eq!(orchestrator.timer_state("newYear"), Some(TimerState::Armed));

    complete_awaited(&mut orchestrator);
    assert!(orchestrator.is_finished());
    assert_eq!(orchestrator.timer_state("newYear"), Some(TimerState::Cancelled));
}

#[tokio::test]
async fn test_service_serializes_commands() {
    let orchestrator = Orchestrator::new(&transport_process(), &EngineConfig::testing()).unwrap();
    let handle = SchedulerService::spawn(orchestrator).unwrap();

    assert!(handle.fire_raw("2,0,moved_to_location").await.unwrap());
    assert!(!handle.fire_raw("2,0,moved_to_location").await.unwrap());
    assert!(handle
        .fire_event(step_update("2", "0", StepStatus::ActionExecuted))
        .await
        .unwrap());
    assert!(!handle
        .update_instance("nowhere", Map::new())
        .await
        .unwrap());

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.active_tasks, vec!["mainTask".to_string()]);
    assert_eq!(
        snapshot.awaited,
        vec![step_update("3", "0", StepStatus::MovedToLocation)]
    );

    let orchestrator = handle.shutdown().await.unwrap();
    assert!(orchestrator.is_running());
}
