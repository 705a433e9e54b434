//! Target Registry and the Pending-Write Set
//!
//! Normalizes a target argument (one unit or a named mapping of units)
//! into a uniform name→unit registry, with every unit's capability
//! checked exactly once at construction. During an invocation the
//! engines hand caller code a set of setters bound to the current
//! window's [`PendingWrites`]; the drained set becomes one atomic
//! [`CommitSet`].
//!
//! Reset requests and plain sets on the same cell are independent
//! structured entries (never synthetic string keys), recorded in call
//! order so a reset followed by a set applies default-then-override.

use crate::diag::{Diagnostic, Reporter};
use crate::error::{ActionError, Result};
use indexmap::IndexMap;
use reflux_graph::{CommitOp, CommitSet, Gate, Unit, UnitKind, Value, ValueMap};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Name under which the single-unit target form is registered
pub const SINGLE_TARGET: &str = "target";

/// Caller-supplied target argument
#[derive(Clone, Debug)]
pub enum TargetShape {
    /// One unit, addressed by setters as [`SINGLE_TARGET`]
    Single(Unit),
    /// Named units; keys unique, insertion order preserved
    Named(IndexMap<String, Unit>),
}

impl TargetShape {
    /// Build a named shape from `(key, unit)` pairs
    pub fn named<K: Into<String>, U: Into<Unit>>(
        entries: impl IntoIterator<Item = (K, U)>,
    ) -> Self {
        TargetShape::Named(
            entries
                .into_iter()
                .map(|(k, u)| (k.into(), u.into()))
                .collect(),
        )
    }
}

impl From<Unit> for TargetShape {
    fn from(unit: Unit) -> Self {
        TargetShape::Single(unit)
    }
}

impl From<reflux_graph::Cell> for TargetShape {
    fn from(cell: reflux_graph::Cell) -> Self {
        TargetShape::Single(cell.into())
    }
}

impl From<reflux_graph::Emitter> for TargetShape {
    fn from(emitter: reflux_graph::Emitter) -> Self {
        TargetShape::Single(emitter.into())
    }
}

impl From<reflux_graph::Operation> for TargetShape {
    fn from(operation: reflux_graph::Operation) -> Self {
        TargetShape::Single(operation.into())
    }
}

impl From<IndexMap<String, Unit>> for TargetShape {
    fn from(map: IndexMap<String, Unit>) -> Self {
        TargetShape::Named(map)
    }
}

/// Uniform name→unit view over a [`TargetShape`]
///
/// Construction validates the shape once: it must name at least one
/// unit, and operation targets are only legal for the async engine.
pub(crate) struct TargetRegistry {
    entries: IndexMap<String, Unit>,
}

impl TargetRegistry {
    pub(crate) fn new(shape: TargetShape, allow_operations: bool) -> Result<Self> {
        let entries = match shape {
            TargetShape::Single(unit) => {
                let mut map = IndexMap::new();
                map.insert(SINGLE_TARGET.to_string(), unit);
                map
            }
            TargetShape::Named(map) => map,
        };

        if entries.is_empty() {
            return Err(ActionError::InvalidConfig(
                "target shape must name at least one unit".into(),
            ));
        }
        for (name, unit) in &entries {
            if unit.kind() == UnitKind::Operation && !allow_operations {
                return Err(ActionError::InvalidConfig(format!(
                    "operation target \"{}\" is only supported by the async engine",
                    name
                )));
            }
        }

        Ok(Self { entries })
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Unit> {
        self.entries.get(name)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &Unit)> {
        self.entries.iter()
    }

    /// Sample every cell target's current value (the "previous values"
    /// reducers see for the rest of the invocation)
    pub(crate) fn snapshot_prev(&self) -> ValueMap {
        self.entries
            .iter()
            .filter_map(|(name, unit)| match unit {
                Unit::Cell(cell) => Some((name.clone(), cell.get())),
                _ => None,
            })
            .collect()
    }
}

/// Which pending slot of a target a write occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WriteKind {
    /// A set (or emit, or inline operation call)
    Set,
    /// A reset-to-default request
    Reset,
}

/// The diagnostic name for a slot; resets are named distinctly
fn diag_name(name: &str, kind: WriteKind) -> String {
    match kind {
        WriteKind::Set => name.to_string(),
        WriteKind::Reset => format!("{}.reinit", name),
    }
}

/// One recorded write
#[derive(Debug, Clone)]
enum PendingOp {
    Set { name: String, value: Value },
    Reset { name: String },
}

/// What a setter asks to record
enum Recorded {
    Set(Value),
    Reset,
    /// Inline operation call: occupies the target's slot for duplicate
    /// detection but contributes nothing to the commit
    CallMarker,
}

impl Recorded {
    fn kind(&self) -> WriteKind {
        match self {
            Recorded::Set(_) | Recorded::CallMarker => WriteKind::Set,
            Recorded::Reset => WriteKind::Reset,
        }
    }
}

/// The Pending-Write Set of one window
#[derive(Default)]
pub(crate) struct PendingWrites {
    entries: Vec<PendingOp>,
    seen: HashSet<(String, WriteKind)>,
}

impl PendingWrites {
    fn is_recorded(&self, name: &str, kind: WriteKind) -> bool {
        self.seen.contains(&(name.to_string(), kind))
    }

    fn record(&mut self, name: &str, recorded: Recorded) {
        self.seen.insert((name.to_string(), recorded.kind()));
        match recorded {
            Recorded::Set(value) => self.entries.push(PendingOp::Set {
                name: name.to_string(),
                value,
            }),
            Recorded::Reset => self.entries.push(PendingOp::Reset {
                name: name.to_string(),
            }),
            Recorded::CallMarker => {}
        }
    }

    /// Replace the recorded value for a target (last-value-wins)
    fn overwrite_set(&mut self, name: &str, value: Value) {
        for op in self.entries.iter_mut().rev() {
            if let PendingOp::Set { name: n, value: v } = op {
                if n == name {
                    *v = value;
                    return;
                }
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain the window into a commit set, in recording order
    pub(crate) fn drain_commit(&mut self, registry: &TargetRegistry) -> CommitSet {
        let mut set = CommitSet::new();
        for op in self.entries.drain(..) {
            match op {
                PendingOp::Set { name, value } => match registry.get(&name) {
                    Some(Unit::Cell(cell)) => set.push(CommitOp::Set {
                        unit: cell.id(),
                        value,
                    }),
                    Some(Unit::Emitter(emitter)) => set.push(CommitOp::Emit {
                        unit: emitter.id(),
                        payload: value,
                    }),
                    _ => {}
                },
                PendingOp::Reset { name } => {
                    if let Some(Unit::Cell(cell)) = registry.get(&name) {
                        set.push(CommitOp::Reinit { unit: cell.id() });
                    }
                }
            }
        }
        self.seen.clear();
        set
    }
}

/// Per-invocation (sync) or per-invocation-with-windows (async) state
/// shared between setters and the owning engine
pub(crate) struct Window {
    pub(crate) pending: PendingWrites,
    /// Gate of the in-flight flush, if one is scheduled (async engine)
    pub(crate) flush: Option<Gate>,
    /// Set once the invocation has settled; later writes are stale
    pub(crate) settled: bool,
}

impl Window {
    pub(crate) fn new() -> Self {
        Self {
            pending: PendingWrites::default(),
            flush: None,
            settled: false,
        }
    }
}

/// How duplicate writes to one target within one window are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DupPolicy {
    /// Report a diagnostic and keep the last value (sync engine)
    LastWins,
    /// Fail the invocation (async engine)
    Strict,
}

/// Hook invoked after every recorded write; the async engine uses it to
/// schedule a flush for the end of the current synchronous stretch
pub(crate) type FlushHook = Rc<dyn Fn() -> Result<()>>;

pub(crate) struct SetterCore {
    pub(crate) registry: Rc<TargetRegistry>,
    pub(crate) prev: ValueMap,
    pub(crate) window: Rc<RefCell<Window>>,
    pub(crate) reporter: Rc<dyn Reporter>,
    pub(crate) policy: DupPolicy,
    pub(crate) flush: Option<FlushHook>,
}

impl SetterCore {
    fn lookup(&self, name: &str) -> Result<Unit> {
        self.registry.get(name).cloned().ok_or_else(|| {
            ActionError::InvalidConfig(format!("unknown target \"{}\"", name))
        })
    }

    /// Record a write into the current window
    ///
    /// Returns `Ok(true)` if recorded, `Ok(false)` if the invocation
    /// had already settled (reported, not applied).
    fn record(&self, name: &str, recorded: Recorded) -> Result<bool> {
        let kind = recorded.kind();
        {
            let mut window = self.window.borrow_mut();
            if window.settled {
                self.reporter.report(&Diagnostic::StaleWrite {
                    target: diag_name(name, kind),
                });
                return Ok(false);
            }
            if window.pending.is_recorded(name, kind) {
                match self.policy {
                    DupPolicy::LastWins => {
                        self.reporter.report(&Diagnostic::MultipleWrites {
                            target: diag_name(name, kind),
                        });
                        if let Recorded::Set(value) = recorded {
                            window.pending.overwrite_set(name, value);
                        }
                    }
                    DupPolicy::Strict => {
                        return Err(ActionError::MultipleWrites {
                            target: diag_name(name, kind),
                        });
                    }
                }
            } else {
                window.pending.record(name, recorded);
            }
        }
        self.schedule_flush()?;
        Ok(true)
    }

    fn schedule_flush(&self) -> Result<()> {
        match &self.flush {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }

    pub(crate) fn set_value(&self, name: &str, value: Value) -> Result<Value> {
        let unit = self.lookup(name)?;
        if unit.kind() == UnitKind::Operation {
            return Err(ActionError::InvalidConfig(format!(
                "target \"{}\" is an operation; invoke it with `call`",
                name
            )));
        }
        self.record(name, Recorded::Set(value.clone()))?;
        Ok(value)
    }

    pub(crate) fn set_reduced(
        &self,
        name: &str,
        reduce: impl FnOnce(&Value) -> Value,
    ) -> Result<Value> {
        let unit = self.lookup(name)?;
        if unit.kind() != UnitKind::Cell {
            return Err(ActionError::InvalidConfig(format!(
                "reducer write requires cell target \"{}\", got {}",
                name,
                unit.kind()
            )));
        }
        // Reducers see the value as sampled at invocation start, never
        // an intermediate pending value
        let previous = self.prev.get(name).cloned().unwrap_or_default();
        let value = reduce(&previous);
        self.record(name, Recorded::Set(value.clone()))?;
        Ok(value)
    }

    pub(crate) fn reset(&self, name: &str) -> Result<()> {
        let unit = self.lookup(name)?;
        if unit.kind() != UnitKind::Cell {
            return Err(ActionError::InvalidConfig(format!(
                "reset requires cell target \"{}\", got {}",
                name,
                unit.kind()
            )));
        }
        self.record(name, Recorded::Reset)?;
        Ok(())
    }

    /// Occupy an operation target's duplicate slot for this window
    ///
    /// Returns `Ok(false)` when the invocation has already settled.
    pub(crate) fn mark_call(&self, name: &str) -> Result<bool> {
        self.record(name, Recorded::CallMarker)
    }
}

/// Setters handed to a sync action's `fn`
///
/// Cell targets accept literal values ([`Setters::set`]) or reducers of
/// the pre-invocation value ([`Setters::set_with`]) and expose
/// [`Setters::reset`]; emitter targets accept literal payloads only.
/// Every write lands in the invocation's pending set and commits as one
/// transaction after `fn` returns.
pub struct Setters {
    pub(crate) core: SetterCore,
}

impl Setters {
    /// Write a literal value to a cell or emitter target; returns the
    /// resolved value
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Value> {
        self.core.set_value(name, value.into())
    }

    /// Write a cell target through a reducer of its pre-invocation
    /// value; returns the resolved value
    pub fn set_with(&self, name: &str, reduce: impl FnOnce(&Value) -> Value) -> Result<Value> {
        self.core.set_reduced(name, reduce)
    }

    /// Request a reset of a cell target to its default value
    pub fn reset(&self, name: &str) -> Result<()> {
        self.core.reset(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::MemoryReporter;
    use reflux_graph::Graph;

    fn registry(graph: &Graph) -> Rc<TargetRegistry> {
        let shape = TargetShape::named([
            ("count", Unit::from(graph.cell(Value::Int(0)))),
            ("log", Unit::from(graph.emitter())),
        ]);
        Rc::new(TargetRegistry::new(shape, false).unwrap())
    }

    fn core(registry: Rc<TargetRegistry>, policy: DupPolicy) -> (SetterCore, Rc<MemoryReporter>) {
        let reporter = Rc::new(MemoryReporter::new());
        let prev = registry.snapshot_prev();
        let core = SetterCore {
            registry,
            prev,
            window: Rc::new(RefCell::new(Window::new())),
            reporter: reporter.clone(),
            policy,
            flush: None,
        };
        (core, reporter)
    }

    #[test]
    fn test_empty_shape_is_invalid() {
        let shape = TargetShape::Named(IndexMap::new());
        assert!(matches!(
            TargetRegistry::new(shape, false),
            Err(ActionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_operation_target_rejected_without_async() {
        let graph = Graph::new();
        let op = graph.operation(|v| Box::pin(async move { Ok(v) }));
        let shape = TargetShape::named([("fetch", Unit::from(op))]);
        assert!(TargetRegistry::new(shape.clone(), false).is_err());
        assert!(TargetRegistry::new(shape, true).is_ok());
    }

    #[test]
    fn test_last_wins_reports_and_overwrites() {
        let graph = Graph::new();
        let registry = registry(&graph);
        let (core, reporter) = core(registry.clone(), DupPolicy::LastWins);

        core.set_value("count", Value::Int(1)).unwrap();
        core.set_value("count", Value::Int(2)).unwrap();

        assert_eq!(
            reporter.entries(),
            vec![Diagnostic::MultipleWrites {
                target: "count".into()
            }]
        );
        let set = core.window.borrow_mut().pending.drain_commit(&registry);
        assert_eq!(set.len(), 1);
        assert!(matches!(
            set.iter().next(),
            Some(CommitOp::Set {
                value: Value::Int(2),
                ..
            })
        ));
    }

    #[test]
    fn test_strict_duplicate_fails() {
        let graph = Graph::new();
        let registry = registry(&graph);
        let (core, _) = core(registry, DupPolicy::Strict);

        core.set_value("count", Value::Int(1)).unwrap();
        let err = core.set_value("count", Value::Int(2)).unwrap_err();
        assert!(matches!(
            err,
            ActionError::MultipleWrites { target } if target == "count"
        ));
    }

    #[test]
    fn test_reset_and_set_are_independent_slots() {
        let graph = Graph::new();
        let registry = registry(&graph);
        let (core, reporter) = core(registry.clone(), DupPolicy::LastWins);

        core.reset("count").unwrap();
        core.set_value("count", Value::Int(5)).unwrap();
        assert!(reporter.is_empty());

        let set = core.window.borrow_mut().pending.drain_commit(&registry);
        let ops: Vec<_> = set.iter().cloned().collect();
        assert!(matches!(ops[0], CommitOp::Reinit { .. }));
        assert!(matches!(
            ops[1],
            CommitOp::Set {
                value: Value::Int(5),
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_reset_named_distinctly() {
        let graph = Graph::new();
        let registry = registry(&graph);
        let (core, reporter) = core(registry, DupPolicy::LastWins);

        core.reset("count").unwrap();
        core.reset("count").unwrap();
        assert_eq!(
            reporter.entries(),
            vec![Diagnostic::MultipleWrites {
                target: "count.reinit".into()
            }]
        );
    }

    #[test]
    fn test_reducer_sees_pre_invocation_value() {
        let graph = Graph::new();
        let registry = registry(&graph);
        let (core, _) = core(registry, DupPolicy::LastWins);

        core.set_value("count", Value::Int(100)).unwrap();
        // Pending 100 is invisible to the reducer; prev was 0
        let resolved = core
            .set_reduced("count", |prev| {
                Value::Int(prev.as_int().unwrap_or(0) + 1)
            })
            .unwrap();
        assert_eq!(resolved, Value::Int(1));
    }

    #[test]
    fn test_settled_window_reports_stale() {
        let graph = Graph::new();
        let registry = registry(&graph);
        let (core, reporter) = core(registry, DupPolicy::LastWins);

        core.window.borrow_mut().settled = true;
        core.set_value("count", Value::Int(1)).unwrap();
        assert_eq!(
            reporter.entries(),
            vec![Diagnostic::StaleWrite {
                target: "count".into()
            }]
        );
        assert!(core.window.borrow().pending.is_empty());
    }

    #[test]
    fn test_reducer_on_emitter_rejected() {
        let graph = Graph::new();
        let registry = registry(&graph);
        let (core, _) = core(registry, DupPolicy::LastWins);
        assert!(core.set_reduced("log", |v| v.clone()).is_err());
    }
}
