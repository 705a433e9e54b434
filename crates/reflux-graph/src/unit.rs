//! Reactive units: cells, emitters, and asynchronous operations
//!
//! A unit is an opaque handle to a piece of reactive state or behavior,
//! owned by a [`Graph`](crate::Graph). Three kinds exist:
//!
//! - [`Cell`]: holds a current value and a default, supports `set` and
//!   `reinit` (reset to default)
//! - [`Emitter`]: fire-and-forget, carries a payload per invocation
//! - [`Operation`]: an asynchronous invocation that resolves to a
//!   result or fails
//!
//! Handles are cheap clones referencing graph-owned state; a unit is
//! never copied, only referenced. Capability is a closed [`UnitKind`]
//! variant, decided at construction time.

use crate::error::Result;
use crate::graph::Graph;
use crate::value::Value;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Unique identifier for a unit
///
/// Ids are allocated from a process-wide counter, so units of
/// different graphs never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl UnitId {
    /// Create a new unit ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit:{}", self.0)
    }
}

/// The capability of a unit, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Holds a current value with a default
    Cell,
    /// Fire-and-forget payload carrier
    Emitter,
    /// Asynchronous invocation returning a result
    Operation,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Cell => write!(f, "cell"),
            UnitKind::Emitter => write!(f, "emitter"),
            UnitKind::Operation => write!(f, "operation"),
        }
    }
}

/// Watcher callback invoked with the committed value or payload
pub type Watcher = Rc<dyn Fn(&Value)>;

/// Handler backing an [`Operation`]
pub type OperationHandler = Rc<dyn Fn(Value) -> LocalBoxFuture<'static, Result<Value>>>;

pub(crate) struct CellSlot {
    pub(crate) value: Value,
    pub(crate) default: Value,
    pub(crate) watchers: Vec<Watcher>,
}

pub(crate) struct EmitterSlot {
    pub(crate) watchers: Vec<Watcher>,
}

pub(crate) struct OperationSlot {
    pub(crate) handler: OperationHandler,
    pub(crate) watchers: RefCell<Vec<Watcher>>,
}

/// Graph-owned storage for one unit
#[derive(Clone)]
pub(crate) enum Slot {
    Cell(Rc<RefCell<CellSlot>>),
    Emitter(Rc<RefCell<EmitterSlot>>),
    Operation(Rc<OperationSlot>),
}

impl Slot {
    pub(crate) fn kind(&self) -> UnitKind {
        match self {
            Slot::Cell(_) => UnitKind::Cell,
            Slot::Emitter(_) => UnitKind::Emitter,
            Slot::Operation(_) => UnitKind::Operation,
        }
    }
}

/// A unit holding a current value with a default
#[derive(Clone)]
pub struct Cell {
    pub(crate) graph: Graph,
    pub(crate) id: UnitId,
    pub(crate) slot: Rc<RefCell<CellSlot>>,
}

impl Cell {
    /// The unit's identity
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Current value
    pub fn get(&self) -> Value {
        self.slot.borrow().value.clone()
    }

    /// The default value this cell resets to
    pub fn default_value(&self) -> Value {
        self.slot.borrow().default.clone()
    }

    /// Set the value as a single-entry commit
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let mut set = crate::commit::CommitSet::new();
        set.push(crate::commit::CommitOp::Set {
            unit: self.id,
            value: value.into(),
        });
        self.graph.commit(set)
    }

    /// Reset the value to the default as a single-entry commit
    pub fn reinit(&self) -> Result<()> {
        let mut set = crate::commit::CommitSet::new();
        set.push(crate::commit::CommitOp::Reinit { unit: self.id });
        self.graph.commit(set)
    }

    /// Observe committed changes; the callback receives the new value
    pub fn watch(&self, f: impl Fn(&Value) + 'static) {
        self.slot.borrow_mut().watchers.push(Rc::new(f));
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell").field("id", &self.id).finish()
    }
}

/// A fire-and-forget unit carrying a payload per invocation
#[derive(Clone)]
pub struct Emitter {
    pub(crate) graph: Graph,
    pub(crate) id: UnitId,
    pub(crate) slot: Rc<RefCell<EmitterSlot>>,
}

impl Emitter {
    /// The unit's identity
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Fire with a payload as a single-entry commit
    pub fn emit(&self, payload: impl Into<Value>) -> Result<()> {
        let mut set = crate::commit::CommitSet::new();
        set.push(crate::commit::CommitOp::Emit {
            unit: self.id,
            payload: payload.into(),
        });
        self.graph.commit(set)
    }

    /// Observe firings; the callback receives the payload
    pub fn watch(&self, f: impl Fn(&Value) + 'static) {
        self.slot.borrow_mut().watchers.push(Rc::new(f));
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("id", &self.id).finish()
    }
}

/// A unit whose invocation runs asynchronously and resolves to a result
#[derive(Clone)]
pub struct Operation {
    pub(crate) id: UnitId,
    pub(crate) slot: Rc<OperationSlot>,
}

impl Operation {
    /// The unit's identity
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Invoke the operation with a payload
    ///
    /// Watchers observe the payload synchronously at call time; the
    /// returned future resolves with the handler's result. The caller
    /// drives the future (typically via the graph's scheduler).
    pub fn call(&self, payload: impl Into<Value>) -> LocalBoxFuture<'static, Result<Value>> {
        let payload = payload.into();
        let watchers: Vec<Watcher> = self.slot.watchers.borrow().clone();
        for w in &watchers {
            w(&payload);
        }
        (self.slot.handler)(payload)
    }

    /// Observe invocations; the callback receives the payload
    pub fn watch(&self, f: impl Fn(&Value) + 'static) {
        self.slot.watchers.borrow_mut().push(Rc::new(f));
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("id", &self.id).finish()
    }
}

/// Any unit, as a closed set of capabilities
#[derive(Clone, Debug)]
pub enum Unit {
    /// A value-holding cell
    Cell(Cell),
    /// A fire-and-forget emitter
    Emitter(Emitter),
    /// An asynchronous operation
    Operation(Operation),
}

impl Unit {
    /// The unit's identity
    pub fn id(&self) -> UnitId {
        match self {
            Unit::Cell(c) => c.id(),
            Unit::Emitter(e) => e.id(),
            Unit::Operation(o) => o.id(),
        }
    }

    /// The unit's capability
    pub fn kind(&self) -> UnitKind {
        match self {
            Unit::Cell(_) => UnitKind::Cell,
            Unit::Emitter(_) => UnitKind::Emitter,
            Unit::Operation(_) => UnitKind::Operation,
        }
    }

    /// Observe firings of this unit regardless of kind
    ///
    /// Cells fire on committed change with the new value, emitters on
    /// emit with the payload, operations on call with the payload.
    pub fn watch(&self, f: impl Fn(&Value) + 'static) {
        match self {
            Unit::Cell(c) => c.watch(f),
            Unit::Emitter(e) => e.watch(f),
            Unit::Operation(o) => o.watch(f),
        }
    }
}

impl From<Cell> for Unit {
    fn from(cell: Cell) -> Self {
        Unit::Cell(cell)
    }
}

impl From<Emitter> for Unit {
    fn from(emitter: Emitter) -> Self {
        Unit::Emitter(emitter)
    }
}

impl From<Operation> for Unit {
    fn from(operation: Operation) -> Self {
        Unit::Operation(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Graph;

    #[test]
    fn test_unit_id_display() {
        let id = UnitId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(format!("{}", id), "unit:42");
    }

    #[test]
    fn test_cell_set_and_reinit() {
        let graph = Graph::new();
        let cell = graph.cell(Value::Int(0));
        cell.set(5i64).unwrap();
        assert_eq!(cell.get(), Value::Int(5));
        cell.reinit().unwrap();
        assert_eq!(cell.get(), Value::Int(0));
    }

    #[test]
    fn test_emitter_watch() {
        let graph = Graph::new();
        let emitter = graph.emitter();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        emitter.watch(move |v| sink.borrow_mut().push(v.clone()));
        emitter.emit("ping").unwrap();
        assert_eq!(seen.borrow().as_slice(), &[Value::String("ping".into())]);
    }

    #[test]
    fn test_operation_call() {
        let graph = Graph::new();
        let op = graph.operation(|payload| {
            Box::pin(async move {
                let n = payload.as_int().unwrap_or(0);
                Ok(Value::Int(n * 2))
            })
        });
        let result = graph.scheduler().run_until(op.call(21i64)).unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn test_unit_kind() {
        let graph = Graph::new();
        let unit: Unit = graph.cell(Value::Null).into();
        assert_eq!(unit.kind(), UnitKind::Cell);
        let unit: Unit = graph.emitter().into();
        assert_eq!(unit.kind(), UnitKind::Emitter);
    }
}
