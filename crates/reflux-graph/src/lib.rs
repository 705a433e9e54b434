//! Reflux Graph - reactive units with atomic multi-target commits
//!
//! This crate provides the reactive substrate the reflux action engines
//! run against:
//! - Dynamic value types (`Value`, `ValueMap`)
//! - Units with fixed capabilities (`Cell`, `Emitter`, `Operation`)
//! - Ordered commit sets applied as one transaction (`CommitSet`)
//! - A cooperative single-threaded scheduler with a condition future
//!   (`Scheduler`, `Gate`)
//!
//! ## Atomicity
//!
//! [`Graph::commit`] applies every write in a [`CommitSet`] before any
//! watcher runs, so observers see a set of simultaneous writes as one
//! state transition, never a prefix of it.
//!
//! ## Scheduling
//!
//! Execution is single-threaded and cooperative. Tasks spawned on the
//! graph's [`Scheduler`] run when the currently executing future
//! yields, which higher layers use to flush batched writes at the end
//! of a synchronous stretch.

mod commit;
mod error;
mod graph;
mod scheduler;
mod unit;
mod value;

pub use commit::{CommitOp, CommitSet};
pub use error::{GraphError, Result};
pub use graph::Graph;
pub use scheduler::{Gate, GateWait, Scheduler};
pub use unit::{Cell, Emitter, Operation, OperationHandler, Unit, UnitId, UnitKind, Watcher};
pub use value::{Value, ValueMap};
