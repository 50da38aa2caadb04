//! The model: every table of the schema plus the wiring between them.

use crate::change::Change;
use crate::error::{ModelError, ModelResult};
use crate::index::{FieldIndex, IndexView, JoinIndex};
use crate::observer::{HandlerToken, Hook, Interest, RowEvent};
use crate::row::Row;
use crate::schema::{JoinSpec, Schema};
use crate::table::Table;
use crate::types::State;
use crate::value::{Part, PrimaryKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A model shared between sessions. One lock serializes all mutation.
pub type SharedModel = Arc<Mutex<Model>>;

/// A join index of `table` fed by rows of another table.
#[derive(Debug, Clone, Copy)]
struct Watcher {
    table: usize,
    join: usize,
    spec: JoinSpec,
}

/// An index found out of step with the rows, reported by [`Model::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// A row with both states absent was left in its table.
    EmptyRow {
        /// Table name.
        table: &'static str,
        /// Row key.
        pkey: PrimaryKey,
    },
    /// A field index differs from one rebuilt from the rows.
    FieldIndex {
        /// Table name.
        table: &'static str,
        /// Indexed column.
        column: &'static str,
    },
    /// A join index differs from one rebuilt from the join table.
    JoinIndex {
        /// Table name.
        table: &'static str,
        /// Remote column.
        column: &'static str,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRow { table, pkey } => write!(f, "{table}/{pkey}: empty row"),
            Self::FieldIndex { table, column } => write!(f, "{table}.{column}: stale index"),
            Self::JoinIndex { table, column } => write!(f, "{table}.{column}: stale join index"),
        }
    }
}

/// Registry of all tables, built once from a schema.
#[derive(Debug)]
pub struct Model {
    schema: Arc<Schema>,
    tables: Vec<Table>,
    by_name: HashMap<&'static str, usize>,
    watchers: HashMap<usize, Vec<Watcher>>,
}

impl Model {
    /// Builds an empty model with one table per descriptor.
    pub fn new(schema: Arc<Schema>) -> Self {
        let tables: Vec<Table> = schema.tables().iter().copied().map(Table::new).collect();
        let by_name: HashMap<_, _> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name(), i))
            .collect();

        let mut watchers: HashMap<usize, Vec<Watcher>> = HashMap::new();
        for (table, t) in tables.iter().enumerate() {
            for (join, spec) in t.descriptor().joins.iter().enumerate() {
                if let Some(&source) = by_name.get(spec.join_table) {
                    watchers.entry(source).or_default().push(Watcher {
                        table,
                        join,
                        spec: *spec,
                    });
                }
            }
        }

        Self {
            schema,
            tables,
            by_name,
            watchers,
        }
    }

    /// Builds an empty model of the fleet schema.
    pub fn standard() -> ModelResult<Self> {
        Ok(Self::new(Arc::new(Schema::standard()?)))
    }

    /// Wraps the model for sharing.
    pub fn into_shared(self) -> SharedModel {
        Arc::new(Mutex::new(self))
    }

    /// Schema the model was built from.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Looks up a table.
    pub fn table(&self, name: &str) -> ModelResult<&Table> {
        self.position(name).map(|i| &self.tables[i])
    }

    /// Iterates over tables in schema order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Looks up a row.
    pub fn get(&self, table: &str, pkey: &PrimaryKey) -> Option<&Row> {
        self.table(table).ok()?.get(pkey)
    }

    /// Looks up a row that must exist.
    pub fn row(&self, table: &str, pkey: &PrimaryKey) -> ModelResult<&Row> {
        self.table(table)?.row(pkey)
    }

    /// Total number of rows.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }

    /// Registers a handler on a table hook.
    pub fn subscribe<F>(
        &mut self,
        table: &str,
        hook: Hook,
        token: HandlerToken,
        interest: Interest,
        handler: F,
    ) -> ModelResult<()>
    where
        F: Fn(&RowEvent<'_>, &mut Vec<Change>) + Send + Sync + 'static,
    {
        let i = self.position(table)?;
        self.tables[i]
            .observers_mut()
            .subscribe(hook, token, interest, handler);
        Ok(())
    }

    /// Removes a handler from a table hook.
    pub fn unsubscribe(&mut self, table: &str, hook: Hook, token: HandlerToken) -> ModelResult<bool> {
        let i = self.position(table)?;
        Ok(self.tables[i].observers_mut().unsubscribe(hook, token))
    }

    /// Sets, patches or deletes one state of a row.
    ///
    /// A `Some` part creates the state or shallow-merges into it; `None`
    /// deletes it. The row is created on first use and removed once both
    /// states are gone. Indexes, join indexes fed by this table and
    /// observers are updated in that order. Follow-up changes pushed by
    /// observers are applied before this call returns.
    pub fn update_row(
        &mut self,
        table: &str,
        pkey: PrimaryKey,
        state: State,
        part: Option<Part>,
    ) -> ModelResult<()> {
        let t = self.position(table)?;
        let followups = self.mutate(t, &pkey, state, part);
        for change in followups {
            self.apply(change)?;
        }
        Ok(())
    }

    /// Applies one change tuple.
    pub fn apply(&mut self, change: Change) -> ModelResult<()> {
        let Change {
            table,
            pkey,
            state,
            part,
        } = change;
        self.update_row(&table, pkey, state, part)
    }

    /// Applies changes strictly in order. Returns how many were applied.
    ///
    /// Stops at the first change naming an unknown table; changes before it
    /// stay applied.
    pub fn load<I>(&mut self, changes: I) -> ModelResult<usize>
    where
        I: IntoIterator<Item = Change>,
    {
        let mut applied = 0;
        for change in changes {
            self.apply(change)?;
            applied += 1;
        }
        trace!(applied, "loaded changes");
        Ok(applied)
    }

    /// Emits one change per present state of every row, for the given
    /// states. Loading the result into an empty model reproduces this one.
    pub fn dump(&self, states: &[State]) -> Vec<Change> {
        self.tables
            .iter()
            .flat_map(Table::rows)
            .flat_map(|row| row.to_changes(states))
            .collect()
    }

    /// Rebuilds every index from the rows and reports differences.
    pub fn verify(&self) -> Vec<Inconsistency> {
        let mut problems = Vec::new();

        for table in &self.tables {
            for row in table.rows().filter(|r| r.is_empty()) {
                problems.push(Inconsistency::EmptyRow {
                    table: table.name(),
                    pkey: row.pkey().clone(),
                });
            }

            for index in table.indexes() {
                let mut fresh = FieldIndex::new(index.column());
                table.rows().for_each(|row| fresh.index_row(row));
                if &fresh != index {
                    problems.push(Inconsistency::FieldIndex {
                        table: table.name(),
                        column: index.column(),
                    });
                }
            }

            for join in table.join_indexes() {
                let spec = join.spec();
                let mut fresh = JoinIndex::new(*spec);
                if let Ok(source) = self.table(spec.join_table) {
                    for row in source.rows() {
                        fresh.insert_pairs(&JoinIndex::pairs(spec, row));
                    }
                }
                if &fresh != join {
                    problems.push(Inconsistency::JoinIndex {
                        table: table.name(),
                        column: join.column(),
                    });
                }
            }
        }

        problems
    }

    fn position(&self, name: &str) -> ModelResult<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::unknown_table(name))
    }

    fn mutate(&mut self, t: usize, pkey: &PrimaryKey, state: State, part: Option<Part>) -> Vec<Change> {
        let mut followups = Vec::new();

        if self.tables[t].ensure_row(pkey) {
            self.tables[t].unindex_row(pkey);
        }
        self.sync_watchers(t, pkey, false);

        self.fire_on(t, pkey, state, Hook::BeforeRowUpdate, &mut followups);

        let had_state = self.tables[t]
            .get(pkey)
            .is_some_and(|row| row.part(state).is_some());
        let state_hook = match (part.is_some(), had_state) {
            (false, true) => {
                self.fire_on(t, pkey, state, Hook::BeforeDeleteState, &mut followups);
                Some(Hook::DeleteState)
            }
            (false, false) => None,
            (true, false) => Some(Hook::CreateState),
            (true, true) => Some(Hook::UpdateState),
        };

        let table = &mut self.tables[t];
        if let Some(row) = table.row_mut(pkey) {
            row.apply(state, part);
        }
        let removed = if table.get(pkey).is_some_and(Row::is_empty) {
            table.remove_row(pkey)
        } else {
            table.index_row(pkey);
            None
        };
        self.sync_watchers(t, pkey, true);

        for hook in std::iter::once(Hook::AfterRowUpdate).chain(state_hook) {
            match &removed {
                Some(row) => self.fire(t, row, state, hook, &mut followups),
                None => self.fire_on(t, pkey, state, hook, &mut followups),
            }
        }

        followups
    }

    /// Moves the pairs of a join row in or out of every watching index.
    fn sync_watchers(&mut self, source: usize, pkey: &PrimaryKey, insert: bool) {
        let Some(watchers) = self.watchers.get(&source) else {
            return;
        };
        let Some(row) = self.tables[source].get(pkey) else {
            return;
        };
        let updates: Vec<_> = watchers
            .iter()
            .map(|w| (*w, JoinIndex::pairs(&w.spec, row)))
            .collect();

        for (watcher, pairs) in updates {
            let table = &mut self.tables[watcher.table];
            if insert {
                table.insert_join_pairs(watcher.join, &pairs);
            } else {
                table.remove_join_pairs(watcher.join, &pairs);
            }
        }
    }

    fn fire_on(
        &self,
        t: usize,
        pkey: &PrimaryKey,
        state: State,
        hook: Hook,
        followups: &mut Vec<Change>,
    ) {
        if let Some(row) = self.tables[t].get(pkey) {
            self.fire(t, row, state, hook, followups);
        }
    }

    fn fire(&self, t: usize, row: &Row, state: State, hook: Hook, followups: &mut Vec<Change>) {
        let table = &self.tables[t];
        let event = RowEvent {
            model: self,
            table,
            row,
            state,
            hook,
        };
        for handler in table.observers().interested(hook, state) {
            handler(&event, followups);
        }
    }
}
