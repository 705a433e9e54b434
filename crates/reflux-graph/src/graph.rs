//! The reactive graph: unit arena, atomic commits, trigger wiring

use crate::commit::{CommitOp, CommitSet};
use crate::error::{GraphError, Result};
use crate::scheduler::Scheduler;
use crate::unit::{
    Cell, CellSlot, Emitter, EmitterSlot, Operation, OperationHandler, OperationSlot, Slot, Unit,
    UnitId, UnitKind, Watcher,
};
use crate::value::Value;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

// Ids are unique across all graphs in the process, so an id allocated
// by one graph can never resolve to a slot in another
static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(0);

struct GraphInner {
    slots: IndexMap<UnitId, Slot>,
}

/// Owner of all units and the entry point for atomic multi-target
/// commits
///
/// A `Graph` is a cheap clone of shared state; handles created from it
/// stay valid for the graph's lifetime. Each graph owns a
/// [`Scheduler`], so tasks queued by a commit producer (such as an
/// async flush) run on the same cooperative queue that drives the
/// graph's futures.
#[derive(Clone)]
pub struct Graph {
    inner: Rc<RefCell<GraphInner>>,
    scheduler: Rc<Scheduler>,
}

impl Graph {
    /// Create an empty graph with its own scheduler
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(GraphInner {
                slots: IndexMap::new(),
            })),
            scheduler: Rc::new(Scheduler::new()),
        }
    }

    /// The cooperative scheduler owned by this graph
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    fn alloc(&self, slot: Slot) -> UnitId {
        let id = UnitId::new(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed));
        self.inner.borrow_mut().slots.insert(id, slot);
        id
    }

    /// Create a cell holding `default`, which is also its reset value
    pub fn cell(&self, default: impl Into<Value>) -> Cell {
        let default = default.into();
        let slot = Rc::new(RefCell::new(CellSlot {
            value: default.clone(),
            default,
            watchers: Vec::new(),
        }));
        let id = self.alloc(Slot::Cell(slot.clone()));
        Cell {
            graph: self.clone(),
            id,
            slot,
        }
    }

    /// Create a fire-and-forget emitter
    pub fn emitter(&self) -> Emitter {
        let slot = Rc::new(RefCell::new(EmitterSlot {
            watchers: Vec::new(),
        }));
        let id = self.alloc(Slot::Emitter(slot.clone()));
        Emitter {
            graph: self.clone(),
            id,
            slot,
        }
    }

    /// Create an asynchronous operation backed by `handler`
    pub fn operation(
        &self,
        handler: impl Fn(Value) -> LocalBoxFuture<'static, Result<Value>> + 'static,
    ) -> Operation {
        self.operation_rc(Rc::new(handler))
    }

    /// Create an operation from an already-shared handler
    pub fn operation_rc(&self, handler: OperationHandler) -> Operation {
        let slot = Rc::new(OperationSlot {
            handler,
            watchers: RefCell::new(Vec::new()),
        });
        let id = self.alloc(Slot::Operation(slot.clone()));
        Operation { id, slot }
    }

    /// Check whether a unit id was allocated by this graph
    pub fn contains(&self, id: UnitId) -> bool {
        self.inner.borrow().slots.contains_key(&id)
    }

    /// Subscribe `callback` to firings of `unit` (clock wiring)
    ///
    /// Cells fire with the new value on committed change, emitters with
    /// the payload on emit, operations with the payload on call.
    pub fn on_fire(&self, unit: &Unit, callback: impl Fn(&Value) + 'static) {
        unit.watch(callback);
    }

    /// Apply a commit set as one transaction
    ///
    /// Validation happens first: unknown units or kind mismatches fail
    /// the whole commit before anything is applied. Then every cell
    /// mutation is applied, and only then are watchers notified, in op
    /// order. No watcher ever observes a partially applied set.
    pub fn commit(&self, set: CommitSet) -> Result<()> {
        enum Planned {
            SetCell(Rc<RefCell<CellSlot>>, Value),
            ReinitCell(Rc<RefCell<CellSlot>>),
            Emit(Rc<RefCell<EmitterSlot>>, Value),
        }

        let mut planned = Vec::with_capacity(set.len());
        {
            let inner = self.inner.borrow();
            for op in set.iter() {
                let slot = inner
                    .slots
                    .get(&op.unit())
                    .ok_or(GraphError::UnknownUnit(op.unit()))?;
                match (op, slot) {
                    (CommitOp::Set { value, .. }, Slot::Cell(cell)) => {
                        planned.push(Planned::SetCell(cell.clone(), value.clone()));
                    }
                    (CommitOp::Reinit { .. }, Slot::Cell(cell)) => {
                        planned.push(Planned::ReinitCell(cell.clone()));
                    }
                    (CommitOp::Emit { payload, .. }, Slot::Emitter(emitter)) => {
                        planned.push(Planned::Emit(emitter.clone(), payload.clone()));
                    }
                    (CommitOp::Set { .. } | CommitOp::Reinit { .. }, other) => {
                        return Err(GraphError::KindMismatch {
                            expected: UnitKind::Cell,
                            got: other.kind(),
                        });
                    }
                    (CommitOp::Emit { .. }, other) => {
                        return Err(GraphError::KindMismatch {
                            expected: UnitKind::Emitter,
                            got: other.kind(),
                        });
                    }
                }
            }
        }

        // Phase 1: apply all state changes, collecting notifications
        let mut notifications: Vec<(Vec<Watcher>, Value)> = Vec::with_capacity(planned.len());
        for plan in &planned {
            match plan {
                Planned::SetCell(slot, value) => {
                    let mut cell = slot.borrow_mut();
                    cell.value = value.clone();
                    notifications.push((cell.watchers.clone(), value.clone()));
                }
                Planned::ReinitCell(slot) => {
                    let mut cell = slot.borrow_mut();
                    cell.value = cell.default.clone();
                    notifications.push((cell.watchers.clone(), cell.value.clone()));
                }
                Planned::Emit(slot, payload) => {
                    notifications.push((slot.borrow().watchers.clone(), payload.clone()));
                }
            }
        }

        // Phase 2: notify with no interior borrows held, so watchers may
        // read cells, register units, or start a nested commit
        for (watchers, value) in notifications {
            for watcher in &watchers {
                watcher(&value);
            }
        }

        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_is_atomic_across_targets() {
        let graph = Graph::new();
        let a = graph.cell(Value::Int(0));
        let b = graph.cell(Value::Int(0));

        // Watcher on `a` must already see the committed value of `b`
        let observed = Rc::new(RefCell::new(Vec::new()));
        let sink = observed.clone();
        let b_reader = b.clone();
        a.watch(move |a_val| {
            sink.borrow_mut().push((a_val.clone(), b_reader.get()));
        });

        let mut set = CommitSet::new();
        set.push(CommitOp::Set {
            unit: a.id(),
            value: Value::Int(1),
        });
        set.push(CommitOp::Set {
            unit: b.id(),
            value: Value::Int(2),
        });
        graph.commit(set).unwrap();

        assert_eq!(
            observed.borrow().as_slice(),
            &[(Value::Int(1), Value::Int(2))]
        );
    }

    #[test]
    fn test_commit_validates_before_applying() {
        let graph = Graph::new();
        let cell = graph.cell(Value::Int(0));
        let emitter = graph.emitter();

        let mut set = CommitSet::new();
        set.push(CommitOp::Set {
            unit: cell.id(),
            value: Value::Int(9),
        });
        // Kind mismatch: Set against an emitter
        set.push(CommitOp::Set {
            unit: emitter.id(),
            value: Value::Int(1),
        });

        let err = graph.commit(set).unwrap_err();
        assert!(matches!(err, GraphError::KindMismatch { .. }));
        // The first op was not applied either
        assert_eq!(cell.get(), Value::Int(0));
    }

    #[test]
    fn test_commit_unknown_unit() {
        let graph = Graph::new();
        let mut set = CommitSet::new();
        set.push(CommitOp::Set {
            unit: UnitId::new(u64::MAX),
            value: Value::Int(1),
        });
        assert!(matches!(
            graph.commit(set),
            Err(GraphError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_foreign_unit_id_never_resolves() {
        // A unit allocated on one graph must not alias a unit of
        // another, even when both graphs allocated the same number of
        // units in the same order
        let graph = Graph::new();
        let victim = graph.cell(Value::Int(0));
        let other = Graph::new();
        let foreign = other.cell(Value::Int(0));

        assert_ne!(victim.id(), foreign.id());
        assert!(!graph.contains(foreign.id()));

        let mut set = CommitSet::new();
        set.push(CommitOp::Set {
            unit: foreign.id(),
            value: Value::Int(99),
        });
        assert!(matches!(
            graph.commit(set),
            Err(GraphError::UnknownUnit(_))
        ));
        assert_eq!(victim.get(), Value::Int(0));
    }

    #[test]
    fn test_reinit_applies_default() {
        let graph = Graph::new();
        let cell = graph.cell(Value::String("base".into()));
        cell.set("changed").unwrap();

        let mut set = CommitSet::new();
        set.push(CommitOp::Reinit { unit: cell.id() });
        graph.commit(set).unwrap();
        assert_eq!(cell.get(), Value::String("base".into()));
    }

    #[test]
    fn test_reinit_then_set_in_one_commit() {
        let graph = Graph::new();
        let cell = graph.cell(Value::Int(0));
        cell.set(5i64).unwrap();

        let mut set = CommitSet::new();
        set.push(CommitOp::Reinit { unit: cell.id() });
        set.push(CommitOp::Set {
            unit: cell.id(),
            value: Value::Int(9),
        });
        graph.commit(set).unwrap();
        // Later op in the same set wins
        assert_eq!(cell.get(), Value::Int(9));
    }

    #[test]
    fn test_watcher_may_commit_reentrantly() {
        let graph = Graph::new();
        let trigger = graph.cell(Value::Int(0));
        let echo = graph.cell(Value::Int(0));

        let echo_handle = echo.clone();
        trigger.watch(move |v| {
            if let Some(n) = v.as_int() {
                // Nested single-entry commit from inside a notification
                echo_handle.set(n * 10).ok();
            }
        });

        trigger.set(4i64).unwrap();
        assert_eq!(echo.get(), Value::Int(40));
    }
}
