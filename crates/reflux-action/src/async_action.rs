//! Async mutation engine
//!
//! [`create_async_action`] returns an [`Operation`]: each call runs one
//! invocation of a caller-supplied future. Writes issued during one
//! synchronous stretch accumulate in a batch window; the first write of
//! a window queues a flush task on the graph's scheduler, which commits
//! the window as one transaction as soon as the stretch yields control.
//! Observers therefore see at most one combined state transition per
//! window, never one per setter call.
//!
//! Unlike the sync engine, a duplicate write to one target within one
//! window is fatal: the setter errors, the invocation fails with that
//! error, and targets recorded earlier in the window still flush. The
//! same target may be written again in a later window.

use crate::diag::{Diagnostic, LogReporter, Reporter};
use crate::error::{ActionError, Result};
use crate::source::{SourceRegistry, SourceShape};
use crate::target::{DupPolicy, SetterCore, TargetRegistry, TargetShape, Window};
use futures::future::LocalBoxFuture;
use reflux_graph::{Gate, Graph, Operation, Unit, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Setters handed to an async action's `fn`
///
/// Cloneable and `'static` so the future can own them across
/// suspension points. Set/reset semantics match the sync
/// [`Setters`](crate::Setters), except duplicates within one batch
/// window are fatal. Operation targets are invoked through
/// [`AsyncSetters::call`].
#[derive(Clone)]
pub struct AsyncSetters {
    core: Rc<SetterCore>,
}

impl AsyncSetters {
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

    /// Invoke an operation target inline
    ///
    /// The operation fires immediately rather than joining the batch,
    /// but it occupies the target's duplicate slot for the current
    /// window. Pending writes from before the call are already
    /// scheduled to flush; the returned future resumes after that
    /// flush has landed.
    pub fn call(
        &self,
        name: &str,
        payload: impl Into<Value>,
    ) -> LocalBoxFuture<'static, Result<Value>> {
        let payload = payload.into();
        let operation = match self.core.registry.get(name) {
            Some(Unit::Operation(operation)) => operation.clone(),
            Some(unit) => {
                let message = format!(
                    "target \"{}\" is a {}, not an operation",
                    name,
                    unit.kind()
                );
                return Box::pin(async move { Err(ActionError::InvalidConfig(message)) });
            }
            None => {
                let message = format!("unknown target \"{}\"", name);
                return Box::pin(async move { Err(ActionError::InvalidConfig(message)) });
            }
        };

        match self.core.mark_call(name) {
            Ok(true) => {}
            Ok(false) => {
                let message = format!("operation \"{}\" called after invocation settled", name);
                return Box::pin(async move { Err(ActionError::Failed(message)) });
            }
            Err(err) => return Box::pin(async move { Err(err) }),
        }

        let gate = self.core.window.borrow().flush.clone();
        let result = operation.call(payload);
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.wait().await;
            }
            result.await.map_err(ActionError::from)
        })
    }
}

/// Asynchronous source accessor handed to an async action's `fn`
///
/// Reading first waits for any in-flight flush to land, then samples
/// the sources fresh: a read issued after a write in the same
/// invocation observes that write's effect even though the commit
/// happens on a queued flush task.
#[derive(Clone)]
pub struct SourceReader {
    registry: Rc<SourceRegistry>,
    window: Rc<RefCell<Window>>,
}

impl SourceReader {
    /// Await consistency, then sample
    ///
    /// Named shapes resolve to a map keyed by convention-free names;
    /// the single-cell form resolves to the bare value.
    pub fn read(&self) -> LocalBoxFuture<'static, Value> {
        let registry = self.registry.clone();
        let window = self.window.clone();
        Box::pin(async move {
            let gate = window.borrow().flush.clone();
            if let Some(gate) = gate {
                gate.wait().await;
            }
            registry.sample()
        })
    }
}

/// Handler run once per invocation
///
/// Arguments: the invocation's setters, the source accessor (when a
/// source shape was configured), and the call payload. The resolved
/// value or error becomes the operation's result.
pub type AsyncActionFn =
    Rc<dyn Fn(AsyncSetters, Option<SourceReader>, Value) -> LocalBoxFuture<'static, Result<Value>>>;

/// Configuration for [`create_async_action`]
pub struct AsyncAction {
    target: TargetShape,
    source: Option<SourceShape>,
    reporter: Rc<dyn Reporter>,
    handler: AsyncActionFn,
}

impl AsyncAction {
    /// Start a config with the required target shape and handler
    pub fn new(
        target: impl Into<TargetShape>,
        handler: impl Fn(AsyncSetters, Option<SourceReader>, Value) -> LocalBoxFuture<'static, Result<Value>>
            + 'static,
    ) -> Self {
        Self {
            target: target.into(),
            source: None,
            reporter: Rc::new(LogReporter),
            handler: Rc::new(handler),
        }
    }

    /// Expose these cells to the handler through a [`SourceReader`]
    pub fn source(mut self, source: impl Into<SourceShape>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Replace the default `log`-backed diagnostic reporter
    pub fn reporter(mut self, reporter: Rc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

/// Queue a flush for the current window unless one is already in
/// flight; later writes in the same stretch join the window
fn make_flush_hook(
    graph: Graph,
    registry: Rc<TargetRegistry>,
    window: Rc<RefCell<Window>>,
    reporter: Rc<dyn Reporter>,
) -> crate::target::FlushHook {
    Rc::new(move || -> Result<()> {
        {
            let window = window.borrow();
            if window.flush.is_some() {
                return Ok(());
            }
        }
        let gate = Gate::new();
        window.borrow_mut().flush = Some(gate.clone());

        let scheduler = graph.scheduler().clone();
        let graph = graph.clone();
        let registry = registry.clone();
        let window = window.clone();
        let reporter = reporter.clone();
        scheduler
            .spawn(async move {
                let set = {
                    let mut window = window.borrow_mut();
                    window.flush = None;
                    window.pending.drain_commit(&registry)
                };
                if let Err(err) = graph.commit(set) {
                    reporter.report(&Diagnostic::InvocationFailed {
                        error: err.to_string(),
                    });
                }
                gate.open();
            })
            .map_err(ActionError::from)
    })
}

/// Create an async action on `graph`
///
/// Returns an [`Operation`]: invoking it runs a new invocation of the
/// handler and resolves or rejects with its result. Configuration
/// problems fail here, never at invocation time.
pub fn create_async_action(graph: &Graph, action: AsyncAction) -> Result<Operation> {
    let registry = Rc::new(TargetRegistry::new(action.target, true)?);
    crate::action::validate_units(graph, &registry)?;
    let sources = action.source.map(|shape| Rc::new(SourceRegistry::new(shape)));
    let reporter = action.reporter;
    let handler = action.handler;
    let graph = graph.clone();

    Ok(graph.clone().operation(move |payload: Value| {
        let window = Rc::new(RefCell::new(Window::new()));
        let setters = AsyncSetters {
            core: Rc::new(SetterCore {
                registry: registry.clone(),
                prev: registry.snapshot_prev(),
                window: window.clone(),
                reporter: reporter.clone(),
                policy: DupPolicy::Strict,
                flush: Some(make_flush_hook(
                    graph.clone(),
                    registry.clone(),
                    window.clone(),
                    reporter.clone(),
                )),
            }),
        };
        let reader = sources.as_ref().map(|registry| SourceReader {
            registry: registry.clone(),
            window: window.clone(),
        });

        let invocation = (handler)(setters, reader, payload);
        let reporter = reporter.clone();
        Box::pin(async move {
            let result = invocation.await;

            // Completion commits the last window: wait for any flush
            // still in flight before settling
            let gate = window.borrow().flush.clone();
            if let Some(gate) = gate {
                gate.wait().await;
            }
            window.borrow_mut().settled = true;

            match result {
                Ok(value) => Ok(value),
                Err(err) => {
                    reporter.report(&Diagnostic::InvocationFailed {
                        error: err.to_string(),
                    });
                    Err(reflux_graph::GraphError::OperationFailed(err.to_string()))
                }
            }
        })
    }))
}
