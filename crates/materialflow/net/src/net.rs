//! Places, transitions and arcs
//!
//! Ids are positions in the owning [`Net`], so they are cheap to copy and
//! lookups never fail for ids handed out by the same net.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a place
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceId(usize);

impl PlaceId {
    pub fn index(&self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Handle of a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionId(usize);

impl TransitionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A token counter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub label: String,
    pub initial_tokens: u32,
}

/// One weighted arc between a place and a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetArc {
    pub place: PlaceId,
    pub weight: u32,
}

/// A transition with its input and output arcs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub label: String,
    pub inputs: Vec<NetArc>,
    pub outputs: Vec<NetArc>,
}

/// Static structure of a token-flow net
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    places: Vec<Place>,
    transitions: Vec<Transition>,
}

impl Net {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ─────────────────────────────────────────────────

    pub fn add_place(&mut self, label: impl Into<String>) -> PlaceId {
        self.add_place_with_tokens(label, 0)
    }

    pub fn add_place_with_tokens(&mut self, label: impl Into<String>, tokens: u32) -> PlaceId {
        let id = PlaceId(self.places.len());
        self.places.push(Place {
            id,
            label: label.into(),
            initial_tokens: tokens,
        });
        id
    }

    pub fn add_transition(&mut self, label: impl Into<String>) -> TransitionId {
        let id = TransitionId(self.transitions.len());
        self.transitions.push(Transition {
            id,
            label: label.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        id
    }

    /// Arc from `place` into `transition` with weight 1
    pub fn add_input(&mut self, place: PlaceId, transition: TransitionId) {
        self.add_input_weighted(place, transition, 1);
    }

    pub fn add_input_weighted(&mut self, place: PlaceId, transition: TransitionId, weight: u32) {
        self.transitions[transition.0]
            .inputs
            .push(NetArc { place, weight });
    }

    /// Arc from `transition` into `place` with weight 1
    pub fn add_output(&mut self, transition: TransitionId, place: PlaceId) {
        self.add_output_weighted(transition, place, 1);
    }

    pub fn add_output_weighted(&mut self, transition: TransitionId, place: PlaceId, weight: u32) {
        self.transitions[transition.0]
            .outputs
            .push(NetArc { place, weight });
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn place(&self, id: PlaceId) -> &Place {
        &self.places[id.0]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Places with the given label, in creation order
    pub fn places_labelled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = PlaceId> + 'a {
        self.places
            .iter()
            .filter(move |p| p.label == label)
            .map(|p| p.id)
    }

    /// Transitions that could fire without any token, which would never settle
    pub fn source_transitions(&self) -> Vec<TransitionId> {
        self.transitions
            .iter()
            .filter(|t| t.inputs.is_empty())
            .map(|t| t.id)
            .collect()
    }
}
