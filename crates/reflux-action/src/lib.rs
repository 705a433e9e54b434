//! Reflux Action - batched multi-target mutations over reflux-graph
//!
//! This crate provides a disciplined way to mutate several independent
//! reactive units from one trigger, guaranteeing that all writes of one
//! logical invocation are observed together rather than as a sequence
//! of partial updates:
//!
//! - [`create_action`], the sync engine: the handler runs to
//!   completion per trigger firing and everything it wrote commits as
//!   one transaction. Duplicate writes to a target within one firing
//!   keep the last value and report a non-fatal diagnostic.
//! - [`create_async_action`], the async engine: the handler may
//!   suspend; writes are grouped into one batch per synchronous stretch
//!   and flushed as soon as the stretch yields. Duplicate writes within
//!   one batch window fail the invocation.
//!
//! ## Example
//!
//! ```rust
//! use reflux_action::{create_action, Action, SINGLE_TARGET};
//! use reflux_graph::{Graph, Value};
//!
//! let graph = Graph::new();
//! let count = graph.cell(Value::Int(0));
//!
//! let bump = create_action(
//!     &graph,
//!     Action::new(count.clone(), |t, _source, _payload| {
//!         t.set_with(SINGLE_TARGET, |prev| {
//!             Value::Int(prev.as_int().unwrap_or(0) + 1)
//!         })
//!         .unwrap();
//!     }),
//! )
//! .unwrap()
//! .expect("no clock configured, so a trigger emitter is returned");
//!
//! bump.emit(Value::Null).unwrap();
//! assert_eq!(count.get(), Value::Int(1));
//! ```
//!
//! Diagnostics are never silent: both engines report duplicate, stale,
//! and failure conditions through a [`Reporter`] (the `log` facade by
//! default) before execution proceeds or the invocation settles.

mod action;
mod async_action;
mod diag;
mod error;
mod source;
mod target;

pub use action::{create_action, Action, ActionFn, ClockShape};
pub use async_action::{
    create_async_action, AsyncAction, AsyncActionFn, AsyncSetters, SourceReader,
};
pub use diag::{Diagnostic, LogReporter, MemoryReporter, Reporter};
pub use error::{ActionError, Result};
pub use source::SourceShape;
pub use target::{Setters, TargetShape, SINGLE_TARGET};
