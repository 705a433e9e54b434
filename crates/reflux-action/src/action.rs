//! Sync mutation engine
//!
//! [`create_action`] wires a caller-supplied synchronous function to
//! one or more trigger units. Per firing: sources are sampled once,
//! fresh setters are bound to an empty pending set, `fn` runs to
//! completion, and everything it wrote commits as one multi-target
//! transaction. Duplicate writes to a target within one firing keep the
//! last value and report a non-fatal diagnostic.

use crate::diag::{Diagnostic, LogReporter, Reporter};
use crate::error::{ActionError, Result};
use crate::source::{SourceRegistry, SourceShape};
use crate::target::{DupPolicy, SetterCore, Setters, TargetRegistry, TargetShape, Window};
use reflux_graph::{Cell, Emitter, Graph, Operation, Unit, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Trigger argument: one unit or an ordered list of units
#[derive(Clone, Debug)]
pub enum ClockShape {
    /// A single trigger
    Single(Unit),
    /// Several triggers, each starting its own invocations
    Many(Vec<Unit>),
}

impl ClockShape {
    fn units(&self) -> Vec<Unit> {
        match self {
            ClockShape::Single(unit) => vec![unit.clone()],
            ClockShape::Many(units) => units.clone(),
        }
    }
}

impl From<Unit> for ClockShape {
    fn from(unit: Unit) -> Self {
        ClockShape::Single(unit)
    }
}

impl From<Cell> for ClockShape {
    fn from(cell: Cell) -> Self {
        ClockShape::Single(cell.into())
    }
}

impl From<Emitter> for ClockShape {
    fn from(emitter: Emitter) -> Self {
        ClockShape::Single(emitter.into())
    }
}

impl From<Operation> for ClockShape {
    fn from(operation: Operation) -> Self {
        ClockShape::Single(operation.into())
    }
}

impl From<Vec<Unit>> for ClockShape {
    fn from(units: Vec<Unit>) -> Self {
        ClockShape::Many(units)
    }
}

/// Handler run once per trigger firing
///
/// Arguments: the invocation's setters, the sampled source (when a
/// source shape was configured), and the trigger payload. The return
/// value is ignored; the handler must not suspend.
pub type ActionFn = Rc<dyn Fn(&Setters, Option<&Value>, &Value)>;

/// Configuration for [`create_action`]
pub struct Action {
    target: TargetShape,
    source: Option<SourceShape>,
    clock: Option<ClockShape>,
    reporter: Rc<dyn Reporter>,
    handler: ActionFn,
}

impl Action {
    /// Start a config with the required target shape and handler
    pub fn new(
        target: impl Into<TargetShape>,
        handler: impl Fn(&Setters, Option<&Value>, &Value) + 'static,
    ) -> Self {
        Self {
            target: target.into(),
            source: None,
            clock: None,
            reporter: Rc::new(LogReporter),
            handler: Rc::new(handler),
        }
    }

    /// Sample these cells once per firing and pass them to the handler
    pub fn source(mut self, source: impl Into<SourceShape>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Drive invocations from these trigger(s) instead of a fresh
    /// emitter
    pub fn clock(mut self, clock: impl Into<ClockShape>) -> Self {
        self.clock = Some(clock.into());
        self
    }

    /// Replace the default `log`-backed diagnostic reporter
    pub fn reporter(mut self, reporter: Rc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

pub(crate) fn validate_units(graph: &Graph, registry: &TargetRegistry) -> Result<()> {
    for (name, unit) in registry.entries() {
        if !graph.contains(unit.id()) {
            return Err(ActionError::InvalidConfig(format!(
                "target \"{}\" belongs to a different graph",
                name
            )));
        }
    }
    Ok(())
}

/// Create a sync action on `graph`
///
/// With a configured clock, the engine wires itself to the given
/// trigger(s) and returns `Ok(None)`. Without one, it creates a fresh
/// emitter, wires it, and returns it; the emitter's payload becomes the
/// trigger value passed to the handler.
///
/// Configuration problems (empty target shape, operation targets,
/// cross-graph units) fail here, never at invocation time.
pub fn create_action(graph: &Graph, action: Action) -> Result<Option<Emitter>> {
    let registry = Rc::new(TargetRegistry::new(action.target, false)?);
    validate_units(graph, &registry)?;
    let sources = action.source.map(|shape| Rc::new(SourceRegistry::new(shape)));
    let reporter = action.reporter;
    let handler = action.handler;

    let run: Rc<dyn Fn(&Value)> = {
        let graph = graph.clone();
        Rc::new(move |payload: &Value| {
            let sampled = sources.as_ref().map(|registry| registry.sample());
            let window = Rc::new(RefCell::new(Window::new()));
            let setters = Setters {
                core: SetterCore {
                    registry: registry.clone(),
                    prev: registry.snapshot_prev(),
                    window: window.clone(),
                    reporter: reporter.clone(),
                    policy: DupPolicy::LastWins,
                    flush: None,
                },
            };

            (handler)(&setters, sampled.as_ref(), payload);

            let set = {
                let mut window = window.borrow_mut();
                window.settled = true;
                window.pending.drain_commit(&registry)
            };
            if let Err(err) = graph.commit(set) {
                reporter.report(&Diagnostic::InvocationFailed {
                    error: err.to_string(),
                });
            }
        })
    };

    match action.clock {
        Some(clock) => {
            for unit in clock.units() {
                let run = run.clone();
                graph.on_fire(&unit, move |payload| run(payload));
            }
            Ok(None)
        }
        None => {
            let emitter = graph.emitter();
            graph.on_fire(&emitter.clone().into(), move |payload| run(payload));
            Ok(Some(emitter))
        }
    }
}
