//! Dual-state rows.

use crate::change::Change;
use crate::model::Model;
use crate::schema::Hop;
use crate::types::State;
use crate::value::{Part, PrimaryKey};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// One entity: a primary key plus its desired and current parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: &'static str,
    pkey: PrimaryKey,
    desired: Option<Part>,
    current: Option<Part>,
}

impl Row {
    /// Creates a row with both states absent.
    pub fn new(table: &'static str, pkey: PrimaryKey) -> Self {
        Self {
            table,
            pkey,
            desired: None,
            current: None,
        }
    }

    /// Name of the owning table.
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Primary key.
    pub fn pkey(&self) -> &PrimaryKey {
        &self.pkey
    }

    /// Desired part, if present.
    pub fn desired(&self) -> Option<&Part> {
        self.desired.as_ref()
    }

    /// Current part, if present.
    pub fn current(&self) -> Option<&Part> {
        self.current.as_ref()
    }

    /// Part for a state.
    pub fn part(&self, state: State) -> Option<&Part> {
        match state {
            State::Desired => self.desired.as_ref(),
            State::Current => self.current.as_ref(),
        }
    }

    /// Field of a state part.
    pub fn get(&self, state: State, key: &str) -> Option<&Value> {
        self.part(state).and_then(|part| part.get(key))
    }

    /// Field of the desired part.
    pub fn get_desired(&self, key: &str) -> Option<&Value> {
        self.get(State::Desired, key)
    }

    /// Field of the current part.
    pub fn get_current(&self, key: &str) -> Option<&Value> {
        self.get(State::Current, key)
    }

    /// Returns true once both states are absent.
    pub fn is_empty(&self) -> bool {
        self.desired.is_none() && self.current.is_none()
    }

    /// Applies a part to a state: `None` clears it, a part on an absent
    /// state sets it, and a part on a present state is shallow-merged in.
    pub(crate) fn apply(&mut self, state: State, part: Option<Part>) {
        let slot = match state {
            State::Desired => &mut self.desired,
            State::Current => &mut self.current,
        };
        match part {
            None => *slot = None,
            Some(patch) => match slot {
                Some(existing) => existing.extend(patch),
                None => *slot = Some(patch),
            },
        }
    }

    /// Dump entries for the requested states that are present.
    pub fn to_changes(&self, states: &[State]) -> Vec<Change> {
        states
            .iter()
            .filter_map(|&state| {
                self.part(state).map(|part| {
                    Change::new(self.table, self.pkey.clone(), state, Some(part.clone()))
                })
            })
            .collect()
    }

    /// Tenants that can access this row.
    ///
    /// Follows every declared chain from this table up to the tenant table
    /// through desired-state foreign keys. A chain with a missing key or a
    /// missing parent row contributes nothing. Rows of tables without a
    /// tenant chain, such as hosts or public images, yield the empty set.
    pub fn get_tenants(&self, model: &Model) -> BTreeSet<PrimaryKey> {
        model
            .schema()
            .tenant_chains(self.table)
            .iter()
            .filter_map(|chain| self.follow(model, chain))
            .map(|tenant| tenant.pkey.clone())
            .collect()
    }

    fn follow<'a>(&'a self, model: &'a Model, chain: &[Hop]) -> Option<&'a Row> {
        chain.iter().try_fold(self, |step, hop| {
            let key = PrimaryKey::from_value(step.get_desired(hop.fkey)?);
            model.table(hop.parent).ok()?.get(&key)
        })
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Row {}/{}", self.table, self.pkey)?;
        if self.desired.is_some() {
            f.write_str(" +desired")?;
        }
        if self.current.is_some() {
            f.write_str(" +current")?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn part(value: Value) -> Option<Part> {
        value.as_object().cloned()
    }

    #[test]
    fn apply_sets_merges_and_clears() {
        let mut row = Row::new("host", PrimaryKey::from("h1"));
        assert!(row.is_empty());

        row.apply(State::Current, part(json!({"uuid": "h1", "state": "present"})));
        row.apply(State::Current, part(json!({"state": "absent", "cpus": 8})));
        assert_eq!(
            row.current(),
            part(json!({"uuid": "h1", "state": "absent", "cpus": 8})).as_ref()
        );
        assert!(row.desired().is_none());

        row.apply(State::Current, None);
        assert!(row.is_empty());
    }

    #[test]
    fn field_access() {
        let mut row = Row::new("nic", PrimaryKey::from("aa"));
        row.apply(State::Desired, part(json!({"host": "h1"})));
        assert_eq!(row.get_desired("host"), Some(&json!("h1")));
        assert_eq!(row.get_current("host"), None);
        assert_eq!(row.get(State::Desired, "bond"), None);
    }

    #[test]
    fn to_changes_skips_absent_states() {
        let mut row = Row::new("host", PrimaryKey::from("h1"));
        row.apply(State::Current, part(json!({"uuid": "h1"})));
        let changes = row.to_changes(&State::ALL);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].state, State::Current);
        assert!(row.to_changes(&[State::Desired]).is_empty());
    }

    #[test]
    fn display() {
        let mut row = Row::new("host", PrimaryKey::from("h1"));
        row.apply(State::Desired, part(json!({})));
        assert_eq!(row.to_string(), "<Row host/h1 +desired>");
    }
}
