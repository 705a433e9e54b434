//! Error types for reflux-action

use reflux_graph::GraphError;
use thiserror::Error;

/// Action error type
///
/// `InvalidConfig` is raised at action construction time, never
/// deferred to invocation time. `MultipleWrites` is the fatal
/// duplicate-write condition of the async engine; the sync engine
/// reports duplicates as non-fatal diagnostics instead.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Invalid action config: {0}")]
    InvalidConfig(String),

    #[error("Multiple writes to target \"{target}\" within one batch window")]
    MultipleWrites { target: String },

    #[error("Action failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ActionError>;
