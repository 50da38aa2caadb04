//! Model fixtures and change builders.
//!
//! Provides convenience functions for setting up models and a reference
//! implementation of row semantics to compare them against.

use serde_json::Value;
use sparkle_core::schema::{fk, JoinSpec};
use sparkle_core::{Change, Model, Part, PrimaryKey, Schema, State, TableDescriptor};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A small schema: tenants own volumes, volumes attach to hosts through
/// the `host_volume` join table.
pub const MINI_TABLES: &[TableDescriptor] = &[
    TableDescriptor::new("host"),
    TableDescriptor::new("host_volume")
        .composite_pkey(&["host", "volume"])
        .indexes(&["host", "volume"])
        .fkeys(&[fk("host"), fk("volume")])
        .virtual_table(),
    TableDescriptor::new("tenant").children(&["volume"]),
    TableDescriptor::new("volume")
        .indexes(&["tenant", "size"])
        .joins(&[JoinSpec::new("host_volume", "volume", "host")])
        .fkeys(&[fk("tenant")]),
];

/// Creates an empty model of the fleet schema.
pub fn standard_model() -> Model {
    Model::standard().expect("Fleet schema is valid")
}

/// Creates an empty model of [`MINI_TABLES`].
pub fn mini_model() -> Model {
    let schema = Schema::new(MINI_TABLES).expect("Mini schema is valid");
    Model::new(Arc::new(schema))
}

/// Converts a JSON object into a part.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn part(value: Value) -> Part {
    match value {
        Value::Object(map) => map,
        other => panic!("Part must be a JSON object, got {other}"),
    }
}

/// Builds a desired-state change.
pub fn desired(table: &str, pkey: impl Into<PrimaryKey>, value: Value) -> Change {
    Change::new(table, pkey, State::Desired, Some(part(value)))
}

/// Builds a current-state change.
pub fn current(table: &str, pkey: impl Into<PrimaryKey>, value: Value) -> Change {
    Change::new(table, pkey, State::Current, Some(part(value)))
}

/// Row contents as a plain map, for comparing models.
pub type RowContents = (Option<Part>, Option<Part>);

/// Straightforward reimplementation of row state semantics.
///
/// A `Some` part creates a state or shallow-merges into it, `None`
/// deletes it, and a row exists while either state does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTable {
    rows: BTreeMap<PrimaryKey, RowContents>,
}

impl ReferenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one change.
    pub fn apply(&mut self, change: &Change) {
        let entry = self.rows.entry(change.pkey.clone()).or_default();
        let slot = match change.state {
            State::Desired => &mut entry.0,
            State::Current => &mut entry.1,
        };
        match &change.part {
            None => *slot = None,
            Some(patch) => match slot {
                Some(existing) => {
                    existing.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())))
                }
                None => *slot = Some(patch.clone()),
            },
        }
        if entry.0.is_none() && entry.1.is_none() {
            self.rows.remove(&change.pkey);
        }
    }

    /// Rows by key.
    pub fn rows(&self) -> &BTreeMap<PrimaryKey, RowContents> {
        &self.rows
    }
}

/// Reads one table of a model into the same shape as [`ReferenceTable::rows`].
pub fn table_contents(model: &Model, table: &str) -> BTreeMap<PrimaryKey, RowContents> {
    model
        .table(table)
        .expect("Table exists")
        .rows()
        .map(|row| {
            (
                row.pkey().clone(),
                (row.desired().cloned(), row.current().cloned()),
            )
        })
        .collect()
}
