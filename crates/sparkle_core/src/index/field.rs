//! Single-column secondary index.

use super::{Buckets, IndexView};
use crate::row::Row;
use crate::types::{PerState, State};
use crate::value::Scalar;

/// Index of one column of a table's own rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIndex {
    column: &'static str,
    buckets: PerState<Buckets>,
}

impl FieldIndex {
    /// Creates an empty index on `column`.
    pub fn new(column: &'static str) -> Self {
        Self {
            column,
            buckets: PerState::default(),
        }
    }

    /// Adds the row under its value of the column, per state.
    pub fn index_row(&mut self, row: &Row) {
        for state in State::ALL {
            if let Some(value) = row.get(state, self.column) {
                self.buckets
                    .get_mut(state)
                    .insert(Scalar::from_value(value), row.pkey().clone());
            }
        }
    }

    /// Removes the row from the buckets its current values put it in.
    pub fn unindex_row(&mut self, row: &Row) {
        for state in State::ALL {
            if let Some(value) = row.get(state, self.column) {
                self.buckets
                    .get_mut(state)
                    .remove(&Scalar::from_value(value), row.pkey());
            }
        }
    }
}

impl IndexView for FieldIndex {
    fn column(&self) -> &'static str {
        self.column
    }

    fn buckets(&self) -> &PerState<Buckets> {
        &self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PrimaryKey;
    use serde_json::json;

    fn nic(pkey: &str, desired: serde_json::Value, current: serde_json::Value) -> Row {
        let mut row = Row::new("nic", PrimaryKey::from(pkey));
        row.apply(State::Desired, desired.as_object().cloned());
        row.apply(State::Current, current.as_object().cloned());
        row
    }

    #[test]
    fn index_then_unindex_restores() {
        let mut index = FieldIndex::new("host");
        let before = index.clone();

        let row = nic("n1", json!({"host": "h1"}), json!({"host": "h2"}));
        index.index_row(&row);
        assert_eq!(
            index.lookup(State::Desired, &"h1".into()).unwrap().len(),
            1
        );
        assert!(index.lookup(State::Desired, &"h2".into()).is_none());
        assert_eq!(index.matching(&"h2".into()).len(), 1);

        index.unindex_row(&row);
        assert_eq!(index, before);
    }

    #[test]
    fn rows_without_column_are_skipped() {
        let mut index = FieldIndex::new("bond");
        index.index_row(&nic("n1", json!({"host": "h1"}), json!(null)));
        assert!(index.buckets().desired.is_empty());
        assert!(index.buckets().current.is_empty());
    }
}
