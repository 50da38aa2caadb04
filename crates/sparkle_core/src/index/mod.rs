//! Secondary indexes.
//!
//! Two kinds of index answer `list` queries:
//!
//! - [`FieldIndex`] maps a column value of the table's own rows to their
//!   primary keys.
//! - [`JoinIndex`] is derived from a join table: it maps the join row's
//!   remote column to the local column, which holds a primary key of the
//!   indexing table.
//!
//! Both keep one bucket map per state and expose the same [`IndexView`]
//! query surface, so table queries do not care which kind they consult.

mod field;
mod join;

pub use field::FieldIndex;
pub use join::{JoinIndex, JoinPair};

use crate::types::{PerState, State};
use crate::value::{PrimaryKey, Scalar};
use std::collections::{BTreeMap, BTreeSet};

/// Value-to-keys map of one index for one state.
///
/// Buckets are pruned as soon as they become empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets(BTreeMap<Scalar, BTreeSet<PrimaryKey>>);

impl Buckets {
    /// Adds `pkey` to the bucket of `value`.
    pub fn insert(&mut self, value: Scalar, pkey: PrimaryKey) -> bool {
        self.0.entry(value).or_default().insert(pkey)
    }

    /// Removes `pkey` from the bucket of `value`, pruning the bucket if it
    /// ends up empty.
    pub fn remove(&mut self, value: &Scalar, pkey: &PrimaryKey) -> bool {
        let Some(keys) = self.0.get_mut(value) else {
            return false;
        };
        let removed = keys.remove(pkey);
        if keys.is_empty() {
            self.0.remove(value);
        }
        removed
    }

    /// Returns the keys stored under `value`.
    pub fn get(&self, value: &Scalar) -> Option<&BTreeSet<PrimaryKey>> {
        self.0.get(value)
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no value is indexed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over buckets in value order.
    pub fn iter(&self) -> impl Iterator<Item = (&Scalar, &BTreeSet<PrimaryKey>)> {
        self.0.iter()
    }
}

/// Query surface shared by every index kind.
pub trait IndexView {
    /// Column name queries use to reach this index.
    fn column(&self) -> &'static str;

    /// Bucket maps, one per state.
    fn buckets(&self) -> &PerState<Buckets>;

    /// Keys indexed under `value` in one state.
    fn lookup(&self, state: State, value: &Scalar) -> Option<&BTreeSet<PrimaryKey>> {
        self.buckets().get(state).get(value)
    }

    /// Keys indexed under `value` in either state.
    fn matching(&self, value: &Scalar) -> BTreeSet<PrimaryKey> {
        State::ALL
            .iter()
            .filter_map(|&state| self.lookup(state, value))
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_prune_on_remove() {
        let mut buckets = Buckets::default();
        assert!(buckets.insert("h1".into(), PrimaryKey::from("n1")));
        assert!(buckets.insert("h1".into(), PrimaryKey::from("n2")));
        assert!(!buckets.insert("h1".into(), PrimaryKey::from("n2")));
        assert_eq!(buckets.len(), 1);

        assert!(buckets.remove(&"h1".into(), &PrimaryKey::from("n1")));
        assert_eq!(buckets.get(&"h1".into()).unwrap().len(), 1);
        assert!(buckets.remove(&"h1".into(), &PrimaryKey::from("n2")));
        assert!(buckets.is_empty());
        assert!(!buckets.remove(&"h1".into(), &PrimaryKey::from("n2")));
    }
}
