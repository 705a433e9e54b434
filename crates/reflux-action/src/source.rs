//! Source Registry
//!
//! Normalizes a source argument (one readable cell or a named mapping
//! of cells) into a uniform registry. Keys presented to caller code
//! never carry the `$` naming-convention prefix; the registry keeps the
//! cell handles and can sample them at any time.

use indexmap::IndexMap;
use reflux_graph::{Cell, Value};

/// Caller-supplied source argument
#[derive(Clone, Debug)]
pub enum SourceShape {
    /// One cell; samples collapse to the bare value
    Single(Cell),
    /// Named cells; samples produce a map keyed by convention-free
    /// names
    Named(IndexMap<String, Cell>),
}

impl SourceShape {
    /// Build a named shape from `(key, cell)` pairs
    pub fn named<K: Into<String>>(entries: impl IntoIterator<Item = (K, Cell)>) -> Self {
        SourceShape::Named(entries.into_iter().map(|(k, c)| (k.into(), c)).collect())
    }
}

impl From<Cell> for SourceShape {
    fn from(cell: Cell) -> Self {
        SourceShape::Single(cell)
    }
}

impl From<IndexMap<String, Cell>> for SourceShape {
    fn from(map: IndexMap<String, Cell>) -> Self {
        SourceShape::Named(map)
    }
}

/// Strip the `$` cell-naming convention from a shape key
fn strip_convention_prefix(key: &str) -> &str {
    key.strip_prefix('$').unwrap_or(key)
}

enum SourceForm {
    Single(Cell),
    /// Entries keyed by the caller-visible (stripped) name
    Named(Vec<(String, Cell)>),
}

/// Uniform view over a [`SourceShape`], able to sample fresh values
pub(crate) struct SourceRegistry {
    form: SourceForm,
}

impl SourceRegistry {
    pub(crate) fn new(shape: SourceShape) -> Self {
        let form = match shape {
            SourceShape::Single(cell) => SourceForm::Single(cell),
            SourceShape::Named(map) => SourceForm::Named(
                map.into_iter()
                    .map(|(key, cell)| (strip_convention_prefix(&key).to_string(), cell))
                    .collect(),
            ),
        };
        Self { form }
    }

    /// Sample every source cell right now
    ///
    /// The single-cell form collapses to the bare value rather than a
    /// one-entry map.
    pub(crate) fn sample(&self) -> Value {
        match &self.form {
            SourceForm::Single(cell) => cell.get(),
            SourceForm::Named(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(name, cell)| (name.clone(), cell.get()))
                    .collect(),
            ),
        }
    }
}
