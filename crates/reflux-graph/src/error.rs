//! Error types for reflux-graph

use crate::unit::{UnitId, UnitKind};
use thiserror::Error;

/// Graph error type
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    #[error("Unit kind mismatch: expected {expected}, got {got}")]
    KindMismatch { expected: UnitKind, got: UnitKind },

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Scheduler is no longer accepting tasks")]
    SchedulerStopped,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GraphError>;
