//! Diagnostic reporting channel
//!
//! Both engines surface every noteworthy condition through a
//! [`Reporter`] before execution proceeds or an invocation settles;
//! nothing is silent. Non-fatal kinds (duplicate writes in a sync
//! tick, writes against a settled invocation) are reported and
//! execution continues; the fatal async kinds are reported and then
//! surfaced as the invocation's failure.

use std::cell::RefCell;
use std::fmt;

/// A reportable condition observed by an engine
///
/// The `target` string names the written target; reset writes are
/// named distinctly as `"<target>.reinit"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Same target written more than once within one tick (sync,
    /// non-fatal: the last value wins)
    MultipleWrites {
        /// Name of the target written twice
        target: String,
    },
    /// Write issued after the owning invocation settled; the value is
    /// not applied
    StaleWrite {
        /// Name of the target written late
        target: String,
    },
    /// An invocation failed (a failed commit, or a failed async
    /// handler); reported before the failure surfaces to the caller
    InvocationFailed {
        /// Stringified failure
        error: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MultipleWrites { target } => write!(
                f,
                "target \"{}\": multiple calls of the same target in one tick; only the last value is applied",
                target
            ),
            Diagnostic::StaleWrite { target } => write!(
                f,
                "target \"{}\": write issued after its invocation settled; value not applied",
                target
            ),
            Diagnostic::InvocationFailed { error } => {
                write!(f, "action invocation failed: {}", error)
            }
        }
    }
}

/// Sink for engine diagnostics
pub trait Reporter {
    /// Deliver one diagnostic
    fn report(&self, diagnostic: &Diagnostic);
}

/// Default reporter forwarding to the `log` facade
///
/// Non-fatal kinds go to `warn`, invocation failures to `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::MultipleWrites { .. } | Diagnostic::StaleWrite { .. } => {
                log::warn!("{}", diagnostic);
            }
            Diagnostic::InvocationFailed { .. } => {
                log::error!("{}", diagnostic);
            }
        }
    }
}

/// Reporter that records diagnostics in memory, for assertions
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: RefCell<Vec<Diagnostic>>,
}

impl MemoryReporter {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// Number of diagnostics reported
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Check whether nothing has been reported
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, diagnostic: &Diagnostic) {
        self.entries.borrow_mut().push(diagnostic.clone());
    }
}
