//! Many-to-many index derived from a join table.

use super::{Buckets, IndexView};
use crate::row::Row;
use crate::schema::JoinSpec;
use crate::types::{PerState, State};
use crate::value::{PrimaryKey, Scalar};

/// One `(remote value, local key)` entry contributed by a join row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPair {
    /// State the pair was read from.
    pub state: State,
    /// Remote column value.
    pub remote: Scalar,
    /// Local column value, a primary key of the indexing table.
    pub local: PrimaryKey,
}

/// Index maintained from the rows of another table.
///
/// The owning table never indexes its own rows into it. The model feeds it
/// the pairs of every join row before and after that row changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinIndex {
    spec: JoinSpec,
    buckets: PerState<Buckets>,
}

impl JoinIndex {
    /// Creates an empty join index.
    pub fn new(spec: JoinSpec) -> Self {
        Self {
            spec,
            buckets: PerState::default(),
        }
    }

    /// Returns the join spec.
    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    /// Extracts the pairs a join row contributes. States lacking either
    /// column contribute nothing.
    pub fn pairs(spec: &JoinSpec, row: &Row) -> Vec<JoinPair> {
        State::ALL
            .iter()
            .filter_map(|&state| {
                let remote = row.get(state, spec.remote)?;
                let local = row.get(state, spec.local)?;
                Some(JoinPair {
                    state,
                    remote: Scalar::from_value(remote),
                    local: PrimaryKey::from_value(local),
                })
            })
            .collect()
    }

    /// Installs pairs.
    pub fn insert_pairs(&mut self, pairs: &[JoinPair]) {
        for pair in pairs {
            self.buckets
                .get_mut(pair.state)
                .insert(pair.remote.clone(), pair.local.clone());
        }
    }

    /// Removes pairs, pruning empty buckets.
    pub fn remove_pairs(&mut self, pairs: &[JoinPair]) {
        for pair in pairs {
            self.buckets
                .get_mut(pair.state)
                .remove(&pair.remote, &pair.local);
        }
    }
}

impl IndexView for JoinIndex {
    fn column(&self) -> &'static str {
        self.spec.remote
    }

    fn buckets(&self) -> &PerState<Buckets> {
        &self.buckets
    }
}
