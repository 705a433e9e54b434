//! Multi-target commit sets
//!
//! A [`CommitSet`] is an ordered list of writes against named units,
//! applied by [`Graph::commit`](crate::Graph::commit) as one
//! transaction: every cell mutation lands before any watcher runs, so
//! an observer never sees a subset of the set's writes.
//!
//! Commit sets are collected by higher layers (the action engines build
//! one per invocation or per batch window) and handed to the graph
//! whole. The types are serializable so a committed batch can be
//! captured for debugging or replay.

use crate::unit::UnitId;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A single write within a commit set
///
/// Values are already resolved: reducers and defaults are evaluated by
/// the layer that builds the set, except `Reinit`, which reads the
/// cell's recorded default at apply time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommitOp {
    /// Set a cell to a value
    Set {
        /// The cell to write
        unit: UnitId,
        /// The resolved value
        value: Value,
    },
    /// Reset a cell to its default value
    Reinit {
        /// The cell to reset
        unit: UnitId,
    },
    /// Fire an emitter with a payload
    Emit {
        /// The emitter to fire
        unit: UnitId,
        /// The payload
        payload: Value,
    },
}

impl CommitOp {
    /// The unit this op writes to
    pub fn unit(&self) -> UnitId {
        match self {
            CommitOp::Set { unit, .. } => *unit,
            CommitOp::Reinit { unit } => *unit,
            CommitOp::Emit { unit, .. } => *unit,
        }
    }
}

/// An ordered collection of writes applied atomically
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitSet {
    ops: Vec<CommitOp>,
}

impl CommitSet {
    /// Create a new empty commit set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an op, preserving order
    pub fn push(&mut self, op: CommitOp) {
        self.ops.push(op);
    }

    /// Number of ops in the set
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate the ops in order
    pub fn iter(&self) -> impl Iterator<Item = &CommitOp> {
        self.ops.iter()
    }

    /// Consume the set and return the underlying ops
    pub fn into_ops(self) -> Vec<CommitOp> {
        self.ops
    }

    /// Clear all ops
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_set_empty() {
        let set = CommitSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_commit_set_push_preserves_order() {
        let mut set = CommitSet::new();
        set.push(CommitOp::Reinit {
            unit: UnitId::new(1),
        });
        set.push(CommitOp::Set {
            unit: UnitId::new(1),
            value: Value::Int(7),
        });
        let units: Vec<_> = set.iter().map(|op| op.unit()).collect();
        assert_eq!(units, vec![UnitId::new(1), UnitId::new(1)]);
        assert!(matches!(set.iter().next(), Some(CommitOp::Reinit { .. })));
    }

    #[test]
    fn test_commit_set_serialization() {
        let mut set = CommitSet::new();
        set.push(CommitOp::Set {
            unit: UnitId::new(3),
            value: Value::String("gold".into()),
        });
        set.push(CommitOp::Emit {
            unit: UnitId::new(4),
            payload: Value::Null,
        });

        let serialized = ron::to_string(&set).expect("serialize");
        let deserialized: CommitSet = ron::from_str(&serialized).expect("deserialize");

        assert_eq!(deserialized.len(), 2);
    }
}
