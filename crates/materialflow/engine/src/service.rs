//! Scheduler service: the orchestrator behind a tokio task
//!
//! One task owns the [`Orchestrator`] and serializes everything that can
//! change it: commands from any number of [`SchedulerHandle`] clones and
//! timer firings. A cascade therefore always completes before the next
//! input is looked at.

use crate::errors::{EngineError, EngineResult};
use crate::orchestrator::Orchestrator;
use crate::timers::TimerFired;
use materialflow_net::PlaceId;
use materialflow_types::Event;
use serde_json::{Map, Value as Json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Command channel depth
const COMMAND_BUFFER: usize = 64;

/// Read-only view of a running orchestrator
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceSnapshot {
    pub running: bool,
    pub finished: bool,
    pub marked: Vec<(PlaceId, u32)>,
    pub awaited: Vec<Event>,
    pub active_tasks: Vec<String>,
}

enum Command {
    Fire {
        event: Event,
        reply: oneshot::Sender<EngineResult<bool>>,
    },
    Raw {
        raw: String,
        reply: oneshot::Sender<EngineResult<bool>>,
    },
    Update {
        instance: String,
        values: Map<String, Json>,
        reply: oneshot::Sender<EngineResult<bool>>,
    },
    Snapshot {
        reply: oneshot::Sender<ServiceSnapshot>,
    },
    Shutdown,
}

/// Spawns the scheduler task
pub struct SchedulerService;

impl SchedulerService {
    /// Start `orchestrator` and move it into a new task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut orchestrator: Orchestrator) -> EngineResult<SchedulerHandle> {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        orchestrator.set_timer_sender(timer_tx);
        if !orchestrator.is_started() {
            orchestrator.start()?;
        }

        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(orchestrator, command_rx, timer_rx));
        tracing::info!("Scheduler service started");
        Ok(SchedulerHandle { commands, task })
    }
}

async fn run(
    mut orchestrator: Orchestrator,
    mut commands: mpsc::Receiver<Command>,
    mut timers: mpsc::UnboundedReceiver<TimerFired>,
) -> Orchestrator {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => handle(&mut orchestrator, command),
            },
            Some(fired) = timers.recv() => {
                if let Err(e) = orchestrator.fire_timer(&fired.instance) {
                    tracing::error!(instance = %fired.instance, error = %e, "Timer delivery failed");
                }
            }
        }
    }
    tracing::info!(finished = orchestrator.is_finished(), "Scheduler service stopped");
    orchestrator
}

fn handle(orchestrator: &mut Orchestrator, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::Fire { event, reply } => {
            let _ = reply.send(orchestrator.fire_event(&event));
        }
        Command::Raw { raw, reply } => {
            let _ = reply.send(orchestrator.fire_raw(&raw));
        }
        Command::Update {
            instance,
            values,
            reply,
        } => {
            let _ = reply.send(orchestrator.update_instance(&instance, &values));
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(snapshot(orchestrator));
        }
        Command::Shutdown => {}
    }
}

fn snapshot(orchestrator: &Orchestrator) -> ServiceSnapshot {
    ServiceSnapshot {
        running: orchestrator.is_running(),
        finished: orchestrator.is_finished(),
        marked: orchestrator.marking().marked(),
        awaited: orchestrator.awaited_events().to_vec(),
        active_tasks: orchestrator
            .active_tasks()
            .iter()
            .map(|t| t.name.clone())
            .collect(),
    }
}

/// Client side of a running scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<Orchestrator>,
}

impl SchedulerHandle {
    pub async fn fire_event(&self, event: Event) -> EngineResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Fire { event, reply }).await?;
        rx.await.map_err(|_| EngineError::ServiceStopped)?
    }

    pub async fn fire_raw(&self, raw: impl Into<String>) -> EngineResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Raw {
            raw: raw.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ServiceStopped)?
    }

    pub async fn update_instance(
        &self,
        instance: impl Into<String>,
        values: Map<String, Json>,
    ) -> EngineResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Update {
            instance: instance.into(),
            values,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ServiceStopped)?
    }

    pub async fn snapshot(&self) -> EngineResult<ServiceSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| EngineError::ServiceStopped)
    }

    /// Stop the service and take the orchestrator back
    pub async fn shutdown(self) -> EngineResult<Orchestrator> {
        // The task may already have stopped; joining below reports that.
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|_| EngineError::ServiceStopped)
    }

    async fn send(&self, command: Command) -> EngineResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::ServiceStopped)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Fire { .. } => "Fire",
            Command::Raw { .. } => "Raw",
            Command::Update { .. } => "Update",
            Command::Snapshot { .. } => "Snapshot",
            Command::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}
