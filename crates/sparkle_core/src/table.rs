//! Indexed dual-state tables.

use crate::error::{ModelError, ModelResult};
use crate::index::{FieldIndex, IndexView, JoinIndex, JoinPair};
use crate::observer::Observers;
use crate::row::Row;
use crate::schema::TableDescriptor;
use crate::value::{PrimaryKey, Scalar};
use std::collections::{BTreeMap, BTreeSet};

/// Equality constraints for [`Table::list`] and [`Table::one`].
///
/// ```
/// use sparkle_core::Filter;
///
/// let filter = Filter::new().eq("host", "h1").eq("bond", "b1");
/// assert_eq!(filter.terms().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    terms: Vec<(String, Scalar)>,
}

impl Filter {
    /// Creates an empty filter, matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `column == value` constraint.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.terms.push((column.into(), value.into()));
        self
    }

    /// Returns the constraints.
    pub fn terms(&self) -> &[(String, Scalar)] {
        &self.terms
    }

    /// Returns true if there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// A named collection of rows with secondary and join indexes.
///
/// Tables are mutated only through [`Model::update_row`](crate::Model::update_row),
/// which keeps indexes, join indexes of watching tables and observers in
/// step with the rows.
#[derive(Debug)]
pub struct Table {
    descriptor: TableDescriptor,
    rows: BTreeMap<PrimaryKey, Row>,
    indexes: Vec<FieldIndex>,
    joins: Vec<JoinIndex>,
    observers: Observers,
}

impl Table {
    /// Creates an empty table from its descriptor.
    pub fn new(descriptor: TableDescriptor) -> Self {
        Self {
            indexes: descriptor.indexes.iter().copied().map(FieldIndex::new).collect(),
            joins: descriptor.joins.iter().copied().map(JoinIndex::new).collect(),
            rows: BTreeMap::new(),
            observers: Observers::new(),
            descriptor,
        }
    }

    /// Table name.
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Table descriptor.
    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true if a row with `pkey` exists.
    pub fn contains(&self, pkey: &PrimaryKey) -> bool {
        self.rows.contains_key(pkey)
    }

    /// Looks up a row.
    pub fn get(&self, pkey: &PrimaryKey) -> Option<&Row> {
        self.rows.get(pkey)
    }

    /// Looks up a row that must exist.
    pub fn row(&self, pkey: &PrimaryKey) -> ModelResult<&Row> {
        self.rows
            .get(pkey)
            .ok_or_else(|| ModelError::row_not_found(self.name(), pkey.clone()))
    }

    /// Iterates over rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Single-column index on `column`.
    pub fn index(&self, column: &str) -> Option<&FieldIndex> {
        self.indexes.iter().find(|i| i.column() == column)
    }

    /// All single-column indexes.
    pub fn indexes(&self) -> &[FieldIndex] {
        &self.indexes
    }

    /// All join indexes.
    pub fn join_indexes(&self) -> &[JoinIndex] {
        &self.joins
    }

    /// Join index keyed by `column`.
    pub fn join_index(&self, column: &str) -> Option<&JoinIndex> {
        self.joins.iter().find(|j| j.column() == column)
    }

    /// Handler registry.
    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Handler registry, mutably.
    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    /// Rows matching every indexed constraint of `filter`.
    ///
    /// A constraint on a column with neither a field index nor a join index
    /// is ignored. Each indexed constraint matches the union of both states.
    /// With no indexed constraint at all, every row is returned.
    pub fn list(&self, filter: &Filter) -> Vec<&Row> {
        let mut selection: Option<BTreeSet<PrimaryKey>> = None;

        for (column, value) in filter.terms() {
            let mut views = self.views(column).peekable();
            if views.peek().is_none() {
                continue;
            }

            let matched: BTreeSet<PrimaryKey> =
                views.flat_map(|view| view.matching(value)).collect();

            selection = Some(match selection {
                None => matched,
                Some(current) => current.intersection(&matched).cloned().collect(),
            });
        }

        match selection {
            None => self.rows.values().collect(),
            Some(keys) => keys.iter().filter_map(|k| self.rows.get(k)).collect(),
        }
    }

    /// The only row matching `filter`, or `None` when zero or several match.
    pub fn one(&self, filter: &Filter) -> Option<&Row> {
        let mut rows = self.list(filter);
        if rows.len() == 1 {
            rows.pop()
        } else {
            None
        }
    }

    fn views<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a dyn IndexView> + 'a {
        let fields = self.indexes.iter().map(|i| i as &dyn IndexView);
        let joins = self.joins.iter().map(|j| j as &dyn IndexView);
        fields.chain(joins).filter(move |v| v.column() == column)
    }

    /// Inserts an empty row unless one exists. Returns true if the row
    /// already existed.
    pub(crate) fn ensure_row(&mut self, pkey: &PrimaryKey) -> bool {
        if self.rows.contains_key(pkey) {
            return true;
        }
        let row = Row::new(self.descriptor.name, pkey.clone());
        self.rows.insert(pkey.clone(), row);
        false
    }

    pub(crate) fn row_mut(&mut self, pkey: &PrimaryKey) -> Option<&mut Row> {
        self.rows.get_mut(pkey)
    }

    pub(crate) fn remove_row(&mut self, pkey: &PrimaryKey) -> Option<Row> {
        self.rows.remove(pkey)
    }

    pub(crate) fn index_row(&mut self, pkey: &PrimaryKey) {
        if let Some(row) = self.rows.get(pkey) {
            for index in &mut self.indexes {
                index.index_row(row);
            }
        }
    }

    pub(crate) fn unindex_row(&mut self, pkey: &PrimaryKey) {
        if let Some(row) = self.rows.get(pkey) {
            for index in &mut self.indexes {
                index.unindex_row(row);
            }
        }
    }

    pub(crate) fn insert_join_pairs(&mut self, join: usize, pairs: &[JoinPair]) {
        if let Some(index) = self.joins.get_mut(join) {
            index.insert_pairs(pairs);
        }
    }

    pub(crate) fn remove_join_pairs(&mut self, join: usize, pairs: &[JoinPair]) {
        if let Some(index) = self.joins.get_mut(join) {
            index.remove_pairs(pairs);
        }
    }
}
