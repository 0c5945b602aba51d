//! Domain types for materialflow
//!
//! A materialflow process is a set of **tasks** whose statements are
//! transport, move and action **orders**. Orders are made of order steps
//! that wait for physical confirmation (a vehicle reached a location, an
//! action was executed). Tasks and steps can be gated by boolean
//! **expressions** over mutable **instances**.
//!
//! # Key Concepts
//!
//! - **Process**: The validated model handed over by the front-end. Structs,
//!   instances, rules, tasks and the order-step catalogs.
//! - **Expression**: Tagged union evaluated against the instance store.
//! - **Event**: The `{type, data}` envelope used to drive a running process.
//! - **ActivationId**: Identity of a live task, order or step instantiation.
//!
//! This crate carries no behavior beyond construction helpers and model
//! queries. Compilation lives in `materialflow-net`, execution in
//! `materialflow-engine`.

#![deny(unsafe_code)]

mod errors;
mod event;
mod expression;
mod ids;
mod order;
mod process;
mod task;
mod value;

pub use errors::*;
pub use event::*;
pub use expression::*;
pub use ids::*;
pub use order::*;
pub use process::*;
pub use task::*;
pub use value::*;
