//! Token-flow runtime
//!
//! [`TokenFlow`] owns the marking and the activation index. An external
//! event adds one token to the place it resolves to; the runtime then fires
//! enabled transitions, first enabled in creation order, until none is
//! enabled. Work produced by callbacks is applied inside the same cascade.

use crate::callbacks::{CallbackBinding, CallbackRegistry};
use crate::errors::RuntimeError;
use crate::index::{ActivationIndex, ActivationKey, Signal};
use crate::net::{Net, PlaceId, Transition};
use materialflow_types::ActivationId;
use std::collections::VecDeque;
use std::sync::Arc;

/// Firing budget of one cascade unless configured otherwise
pub const DEFAULT_MAX_CASCADE_STEPS: usize = 10_000;

/// Token counts per place
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marking {
    tokens: Vec<u32>,
}

impl Marking {
    /// The initial marking of `net`
    pub fn initial(net: &Net) -> Self {
        Self {
            tokens: net.places().iter().map(|p| p.initial_tokens).collect(),
        }
    }

    pub fn get(&self, place: PlaceId) -> u32 {
        self.tokens.get(place.index()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.tokens.iter().map(|t| u64::from(*t)).sum()
    }

    /// Places holding at least one token
    pub fn marked(&self) -> Vec<(PlaceId, u32)> {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| **t > 0)
            .map(|(i, t)| (PlaceId::from_index(i), *t))
            .collect()
    }

    pub fn is_enabled(&self, transition: &Transition) -> bool {
        transition
            .inputs
            .iter()
            .all(|arc| self.get(arc.place) >= arc.weight)
    }

    fn add(&mut self, place: PlaceId, tokens: u32) {
        if let Some(count) = self.tokens.get_mut(place.index()) {
            *count += tokens;
        }
    }

    fn fire(&mut self, transition: &Transition) {
        for arc in &transition.inputs {
            if let Some(count) = self.tokens.get_mut(arc.place.index()) {
                *count -= arc.weight;
            }
        }
        for arc in &transition.outputs {
            self.add(arc.place, arc.weight);
        }
    }
}

/// An external signal addressed to one activation
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NetEvent {
    pub key: ActivationKey,
    pub signal: Signal,
}

impl NetEvent {
    pub fn new(key: ActivationKey, signal: Signal) -> Self {
        Self { key, signal }
    }

    pub fn started_by(task: ActivationId, step: Option<ActivationId>) -> Self {
        Self::new(ActivationKey { task, step }, Signal::StartGate)
    }

    pub fn finished_by(task: ActivationId, step: Option<ActivationId>) -> Self {
        Self::new(ActivationKey { task, step }, Signal::FinishGate)
    }

    pub fn step_signal(task: ActivationId, step: ActivationId, signal: Signal) -> Self {
        Self::new(ActivationKey::step(task, step), signal)
    }
}

/// Work queued by a callback during a cascade
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkItem {
    /// Resolved through the activation index like an external event
    Signal(NetEvent),
    /// Token for an internal control place
    Token(PlaceId),
}

/// Receives every callback bound to a fired transition
pub trait FireHandler {
    type Error: From<RuntimeError>;

    /// Handle one binding; the returned work joins the current cascade
    fn on_fire(
        &mut self,
        binding: &CallbackBinding,
        index: &mut ActivationIndex,
    ) -> Result<Vec<WorkItem>, Self::Error>;
}

/// Live state of one compiled net
#[derive(Clone, Debug)]
pub struct TokenFlow {
    net: Arc<Net>,
    callbacks: Arc<CallbackRegistry>,
    marking: Marking,
    index: ActivationIndex,
    max_steps: usize,
}

impl TokenFlow {
    pub fn new(net: Arc<Net>, callbacks: Arc<CallbackRegistry>, index: ActivationIndex) -> Self {
        let marking = Marking::initial(&net);
        Self {
            net,
            callbacks,
            marking,
            index,
            max_steps: DEFAULT_MAX_CASCADE_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    pub fn tokens(&self, place: PlaceId) -> u32 {
        self.marking.get(place)
    }

    pub fn index(&self) -> &ActivationIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut ActivationIndex {
        &mut self.index
    }

    /// The place `event` would put its token into, if it is accepted now
    ///
    /// Events are rejected when the activation is unknown, when no place is
    /// registered for the signal, when the signal was already consumed for
    /// this activation id, or when its place already holds a token.
    pub fn resolve(&self, event: &NetEvent) -> Option<PlaceId> {
        self.index
            .resolve(&event.key, event.signal)
            .filter(|place| self.marking.get(*place) == 0)
    }

    /// Apply an external event and run the resulting cascade
    ///
    /// Returns `Ok(false)` without touching any state when the event does
    /// not resolve.
    pub fn apply_event<H: FireHandler>(
        &mut self,
        event: &NetEvent,
        handler: &mut H,
    ) -> Result<bool, H::Error> {
        let Some(place) = self.resolve(event) else {
            tracing::debug!(key = %event.key, signal = ?event.signal, "Event not resolved");
            return Ok(false);
        };
        self.marking.add(place, 1);
        self.drain(handler)?;
        Ok(true)
    }

    /// Put a token into a control place and run the resulting cascade
    pub fn inject<H: FireHandler>(&mut self, place: PlaceId, handler: &mut H) -> Result<usize, H::Error> {
        self.marking.add(place, 1);
        self.drain(handler)
    }

    /// Fire from the current marking until nothing is enabled
    pub fn settle<H: FireHandler>(&mut self, handler: &mut H) -> Result<usize, H::Error> {
        self.drain(handler)
    }

    fn drain<H: FireHandler>(&mut self, handler: &mut H) -> Result<usize, H::Error> {
        let mut queue: VecDeque<WorkItem> = VecDeque::new();
        let mut fired = 0;
        loop {
            while let Some(item) = queue.pop_front() {
                self.apply_work(item);
            }
            let Some(position) = self.first_enabled() else {
                break;
            };
            if fired >= self.max_steps {
                return Err(RuntimeError::CascadeLimit {
                    limit: self.max_steps,
                }
                .into());
            }

            let transition = &self.net.transitions()[position];
            self.marking.fire(transition);
            for arc in &transition.inputs {
                self.index.mark_consumed(arc.place);
            }
            fired += 1;
            tracing::trace!(transition = %transition.id, label = %transition.label, "Transition fired");

            for binding in self.callbacks.bindings(transition.id) {
                queue.extend(handler.on_fire(binding, &mut self.index)?);
            }
        }
        if fired > 0 {
            tracing::debug!(fired, tokens = self.marking.total(), "Cascade settled");
        }
        Ok(fired)
    }

    fn apply_work(&mut self, item: WorkItem) {
        match item {
            WorkItem::Token(place) => self.marking.add(place, 1),
            WorkItem::Signal(event) => match self.resolve(&event) {
                Some(place) => self.marking.add(place, 1),
                None => {
                    tracing::debug!(key = %event.key, signal = ?event.signal, "Queued signal not resolved")
                }
            },
        }
    }

    fn first_enabled(&self) -> Option<usize> {
        self.net
            .transitions()
            .iter()
            .position(|t| self.marking.is_enabled(t))
    }
}
