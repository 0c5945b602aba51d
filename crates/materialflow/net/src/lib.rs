//! Token-flow nets for materialflow
//!
//! A process model is compiled once into a net of places (token counters)
//! and transitions. Tokens then move only in response to external events.
//!
//! # Architecture
//!
//! - [`NetBuilder`]: Validates a [`Process`](materialflow_types::Process)
//!   and compiles it into a [`CompiledNet`]
//! - [`Net`]: Places, transitions and weighted arcs
//! - [`CallbackRegistry`]: Lifecycle callbacks bound to transitions
//! - [`ActivationTable`]: Task, order, step, condition and loop activations
//! - [`ActivationIndex`]: Maps `(task, step)` ids and signals to places
//! - [`TokenFlow`]: Holds the marking and fires transitions to a fixed point
//!
//! The runtime never interprets callbacks itself. Each firing is handed to a
//! [`FireHandler`], which may answer with further [`WorkItem`]s that are
//! applied within the same cascade.

#![deny(unsafe_code)]

pub mod activation;
pub mod builder;
pub mod callbacks;
mod catalog;
pub mod errors;
pub mod index;
pub mod net;
pub mod runtime;

pub use activation::{
    ActivationTable, ConditionActivation, ConditionSlot, LoopActivation, LoopKind, LoopSlot,
    OrderActivation, OrderSlot, StepActivation, StepRole, StepSlot, TaskActivation, TaskSlot,
};
pub use builder::{CompiledNet, NetBuilder, NetCompiler, RootPlaces};
pub use callbacks::{CallbackBinding, CallbackKind, CallbackRegistry};
pub use errors::{BuildError, BuildErrors, BuildResult, ConstructKind, RuntimeError};
pub use index::{ActivationIndex, ActivationKey, Signal};
pub use net::{Net, NetArc, Place, PlaceId, Transition, TransitionId};
pub use runtime::{FireHandler, Marking, NetEvent, TokenFlow, WorkItem};
