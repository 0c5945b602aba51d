//! Cron timers for `Time` instances
//!
//! Each `Time`-family instance carries a cron expression in its `timing`
//! attribute. The orchestrator computes the next occurrence when the
//! process starts and arms a one-shot tokio task per timer that reports
//! [`TimerFired`] over a channel. Firing sets the instance's `value` to
//! `true`, which is what gates waiting on the timer observe.

use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::BTreeMap;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Message sent by an armed timer when it elapses
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerFired {
    pub instance: String,
}

/// Lifecycle of one timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Armed,
    Fired,
    Cancelled,
}

/// A computed schedule for one instance
#[derive(Clone, Debug)]
pub struct TimerSpec {
    pub instance: String,
    pub due: DateTime<Utc>,
}

/// Parse a `timing` attribute
///
/// Five-field expressions (minute to weekday) are accepted by prepending a
/// zero seconds field.
pub fn parse_timing(instance: &str, timing: &str) -> EngineResult<Schedule> {
    let expression = match timing.split_whitespace().count() {
        5 => format!("0 {}", timing.trim()),
        _ => timing.trim().to_string(),
    };
    Schedule::from_str(&expression).map_err(|e| EngineError::TimerScheduling {
        instance: instance.to_string(),
        reason: e.to_string(),
    })
}

/// Next occurrence of `timing` strictly after `now`
pub fn schedule(instance: &str, timing: &str, now: DateTime<Utc>) -> EngineResult<TimerSpec> {
    let due = parse_timing(instance, timing)?
        .after(&now)
        .next()
        .ok_or_else(|| EngineError::TimerScheduling {
            instance: instance.to_string(),
            reason: "schedule has no upcoming occurrence".to_string(),
        })?;
    Ok(TimerSpec {
        instance: instance.to_string(),
        due,
    })
}

#[derive(Debug)]
struct Timer {
    due: DateTime<Utc>,
    state: TimerState,
    task: Option<JoinHandle<()>>,
}

/// The armed timers of one run
#[derive(Debug, Default)]
pub struct TimerSet {
    sender: Option<mpsc::UnboundedSender<TimerFired>>,
    timers: BTreeMap<String, Timer>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver elapsed timers on `sender`; without one timers only fire manually
    pub fn set_sender(&mut self, sender: mpsc::UnboundedSender<TimerFired>) {
        self.sender = Some(sender);
    }

    /// Arm one timer per spec
    ///
    /// Tasks are only spawned when a sender is installed and a tokio
    /// runtime is current.
    pub fn arm(&mut self, specs: Vec<TimerSpec>) {
        for spec in specs {
            let task = self.spawn(&spec);
            tracing::info!(
                instance = %spec.instance,
                due = %spec.due,
                spawned = task.is_some(),
                "Timer armed"
            );
            self.timers.insert(
                spec.instance,
                Timer {
                    due: spec.due,
                    state: TimerState::Armed,
                    task,
                },
            );
        }
    }

    fn spawn(&self, spec: &TimerSpec) -> Option<JoinHandle<()>> {
        let sender = self.sender.clone()?;
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let delay = (spec.due - Utc::now()).to_std().unwrap_or_default();
        let fired = TimerFired {
            instance: spec.instance.clone(),
        };
        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(fired).is_err() {
                tracing::debug!("Timer elapsed after the scheduler stopped");
            }
        }))
    }

    /// Cancel every armed timer
    ///
    /// A timer whose task already completed has delivered its message and
    /// counts as fired.
    pub fn cancel_all(&mut self) {
        for (instance, timer) in &mut self.timers {
            if timer.state != TimerState::Armed {
                continue;
            }
            match timer.task.take() {
                Some(task) if task.is_finished() => timer.state = TimerState::Fired,
                Some(task) => {
                    task.abort();
                    timer.state = TimerState::Cancelled;
                }
                None => timer.state = TimerState::Cancelled,
            }
            tracing::debug!(instance = %instance, state = ?timer.state, "Timer stopped");
        }
    }

    pub fn mark_fired(&mut self, instance: &str) {
        if let Some(timer) = self.timers.get_mut(instance) {
            if timer.state == TimerState::Armed {
                timer.state = TimerState::Fired;
            }
        }
    }

    pub fn state(&self, instance: &str) -> Option<TimerState> {
        self.timers.get(instance).map(|t| t.state)
    }

    pub fn due(&self, instance: &str) -> Option<DateTime<Utc>> {
        self.timers.get(instance).map(|t| t.due)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_five_field_timing_accepted() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap();
        let spec = schedule("shiftEnd", "30 10 * * *", now).unwrap();
        assert_eq!(spec.due.hour(), 10);
        assert_eq!(spec.due.minute(), 30);
        assert_eq!(spec.due.second(), 0);
    }

    #[test]
    fn test_malformed_timing_rejected() {
        let err = parse_timing("broken", "every tuesday").unwrap_err();
        assert!(matches!(err, EngineError::TimerScheduling { ref instance, .. } if instance == "broken"));
    }

    #[test]
    fn test_cancel_without_task() {
        let mut timers = TimerSet::new();
        timers.arm(vec![TimerSpec {
            instance: "t".into(),
            due: Utc::now(),
        }]);
        assert_eq!(timers.state("t"), Some(TimerState::Armed));
        timers.cancel_all();
        assert_eq!(timers.state("t"), Some(TimerState::Cancelled));
        timers.mark_fired("t");
        assert_eq!(timers.state("t"), Some(TimerState::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new();
        timers.set_sender(tx);
        timers.arm(vec![TimerSpec {
            instance: "t".into(),
            due: Utc::now() + chrono::Duration::seconds(30),
        }]);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.instance, "t");
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_timer_counts_as_fired_on_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new();
        timers.set_sender(tx);
        timers.arm(vec![TimerSpec {
            instance: "t".into(),
            due: Utc::now(),
        }]);
        rx.recv().await.unwrap();
        tokio::task::yield_now().await;
        timers.cancel_all();
        assert_eq!(timers.state("t"), Some(TimerState::Fired));
    }
}
