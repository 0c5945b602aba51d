//! Orchestration engine for materialflow processes
//!
//! Drives a compiled process net in response to external events and
//! instance updates, evaluating gates, conditions, loop limits and rules
//! against the current instance values.
//!
//! # Architecture
//!
//! - [`Orchestrator`]: Owns one run. Every operation is transactional and
//!   notifies listeners only once it has committed
//! - [`StandardEvaluator`]: Strictly typed expression and rule evaluation
//! - [`CallbackContext`]: Reacts to fired transitions (registries, loop id
//!   re-minting, gate evaluation)
//! - [`TimerSet`]: Cron timers of `Time` instances as one-shot tokio tasks
//! - [`SchedulerService`]: Serializes commands and timer firings in a
//!   single tokio task
//! - [`EngineConfig`]: Layered configuration (defaults, file, environment)
//!
//! # Example
//!
//! ```no_run
//! use materialflow_engine::{EngineConfig, EventLog, Orchestrator};
//! use materialflow_types::Process;
//!
//! # fn run(process: Process) -> materialflow_engine::EngineResult<()> {
//! let mut orchestrator = Orchestrator::new(&process, &EngineConfig::default())?;
//! let log = EventLog::new();
//! orchestrator.add_listener(log.clone());
//! orchestrator.start()?;
//! orchestrator.fire_raw("step-1,task-0,moved_to_location")?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod evaluator;
pub mod lifecycle;
pub mod listener;
pub mod orchestrator;
pub mod service;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod timers;

pub use config::{EngineConfig, LoggingConfig};
pub use errors::{EngineError, EngineResult, EvalError, EvalResult};
pub use evaluator::{ExpressionEvaluator, StandardEvaluator, DEFAULT_MAX_RULE_DEPTH};
pub use lifecycle::{CallbackContext, Statics};
pub use listener::{EventLog, LifecycleEvent, LifecycleListener};
pub use orchestrator::{Orchestrator, SnapshotHook};
pub use service::{SchedulerHandle, SchedulerService, ServiceSnapshot};
pub use state::{Activity, GateKey, GatePhase, RunState};
pub use store::{InstanceStore, RuleBook};
pub use telemetry::init_tracing;
pub use timers::{TimerFired, TimerSet, TimerSpec, TimerState};
