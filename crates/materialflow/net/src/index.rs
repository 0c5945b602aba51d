//! Activation index: external signal to net place
//!
//! Events name a task id and optionally an order-step id. The index maps
//! that pair and the kind of signal to the place that receives the token.
//! Each signal is accepted once per activation id: after its place has been
//! consumed by a firing, further signals for the same id are rejected until
//! the id is relocated by a new loop iteration.

use crate::PlaceId;
use materialflow_types::{ActivationId, StepStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// `(task id, optional step id)`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationKey {
    pub task: ActivationId,
    pub step: Option<ActivationId>,
}

impl ActivationKey {
    pub fn task(task: ActivationId) -> Self {
        Self { task, step: None }
    }

    pub fn step(task: ActivationId, step: ActivationId) -> Self {
        Self {
            task,
            step: Some(step),
        }
    }
}

impl fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "{}/{}", self.task, step),
            None => write!(f, "{}", self.task),
        }
    }
}

/// Externally delivered signals
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StartGate,
    FinishGate,
    MovedToLocation,
    ActionExecuted,
}

impl From<StepStatus> for Signal {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::MovedToLocation => Signal::MovedToLocation,
            StepStatus::ActionExecuted => Signal::ActionExecuted,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct SignalTargets {
    places: BTreeMap<Signal, PlaceId>,
    spent: BTreeSet<Signal>,
}

/// The activation index
#[derive(Clone, Debug, Default)]
pub struct ActivationIndex {
    entries: HashMap<ActivationKey, SignalTargets>,
    owners: HashMap<PlaceId, (ActivationKey, Signal)>,
}

impl ActivationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure an entry exists for `key`, even one without signal places
    pub fn insert_key(&mut self, key: ActivationKey) {
        self.entries.entry(key).or_default();
    }

    /// Register the place receiving `signal` for `key`
    pub fn register(&mut self, key: ActivationKey, signal: Signal, place: PlaceId) {
        self.owners.insert(place, (key.clone(), signal));
        self.entries.entry(key).or_default().places.insert(signal, place);
    }

    pub fn contains(&self, key: &ActivationKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The place registered for `signal`, whether or not it was consumed
    pub fn target(&self, key: &ActivationKey, signal: Signal) -> Option<PlaceId> {
        self.entries
            .get(key)
            .and_then(|entry| entry.places.get(&signal).copied())
    }

    /// The place accepting `signal` now, or `None` once it was consumed
    pub fn resolve(&self, key: &ActivationKey, signal: Signal) -> Option<PlaceId> {
        let entry = self.entries.get(key)?;
        if entry.spent.contains(&signal) {
            return None;
        }
        entry.places.get(&signal).copied()
    }

    pub fn is_spent(&self, key: &ActivationKey, signal: Signal) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.spent.contains(&signal))
            .unwrap_or(false)
    }

    /// Record that a firing consumed `place`; no-op for non-signal places
    pub fn mark_consumed(&mut self, place: PlaceId) {
        if let Some((key, signal)) = self.owners.get(&place) {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.spent.insert(*signal);
            }
        }
    }

    /// Move every entry of task `old` to task `new`, step entries included
    ///
    /// Returns the number of relocated entries. Consumption state is reset.
    pub fn relocate_task(&mut self, old: &ActivationId, new: &ActivationId) -> usize {
        let keys: Vec<ActivationKey> = self
            .entries
            .keys()
            .filter(|k| &k.task == old)
            .cloned()
            .collect();
        for key in &keys {
            let moved = ActivationKey {
                task: new.clone(),
                step: key.step.clone(),
            };
            self.relocate(key, moved);
        }
        keys.len()
    }

    /// Move the entry of one step to a new step id within the same task
    pub fn relocate_step(
        &mut self,
        task: &ActivationId,
        old: &ActivationId,
        new: &ActivationId,
    ) -> bool {
        let key = ActivationKey::step(task.clone(), old.clone());
        if !self.entries.contains_key(&key) {
            return false;
        }
        self.relocate(&key, ActivationKey::step(task.clone(), new.clone()));
        true
    }

    fn relocate(&mut self, from: &ActivationKey, to: ActivationKey) {
        if let Some(mut entry) = self.entries.remove(from) {
            entry.spent.clear();
            for (signal, place) in &entry.places {
                self.owners.insert(*place, (to.clone(), *signal));
            }
            self.entries.insert(to, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ActivationKey> {
        self.entries.keys()
    }
}
