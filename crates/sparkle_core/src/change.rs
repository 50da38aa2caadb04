//! Change tuples for dump, load and replication.

use crate::types::State;
use crate::value::{Part, PrimaryKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Reference to one row: table name plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowRef {
    /// Table name.
    pub table: String,
    /// Primary key within the table.
    pub pkey: PrimaryKey,
}

impl RowRef {
    /// Creates a row reference.
    pub fn new(table: impl Into<String>, pkey: impl Into<PrimaryKey>) -> Self {
        Self {
            table: table.into(),
            pkey: pkey.into(),
        }
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.pkey)
    }
}

type ChangeTuple = (String, PrimaryKey, State, Option<Part>);

/// A single state mutation: `(table, pkey, state, part)`.
///
/// A `None` part deletes the named state. Serialized as the four-element
/// array used by snapshots and the wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ChangeTuple", into = "ChangeTuple")]
pub struct Change {
    /// Table name.
    pub table: String,
    /// Primary key of the row.
    pub pkey: PrimaryKey,
    /// Which state the change applies to.
    pub state: State,
    /// New or patch content, `None` to delete the state.
    pub part: Option<Part>,
}

impl Change {
    /// Creates a change.
    pub fn new(
        table: impl Into<String>,
        pkey: impl Into<PrimaryKey>,
        state: State,
        part: Option<Part>,
    ) -> Self {
        Self {
            table: table.into(),
            pkey: pkey.into(),
            state,
            part,
        }
    }

    /// Creates a change that deletes a state.
    pub fn delete(table: impl Into<String>, pkey: impl Into<PrimaryKey>, state: State) -> Self {
        Self::new(table, pkey, state, None)
    }

    /// Returns the row this change targets.
    pub fn row_ref(&self) -> RowRef {
        RowRef {
            table: self.table.clone(),
            pkey: self.pkey.clone(),
        }
    }

    /// Returns true if this change deletes its state.
    pub fn is_delete(&self) -> bool {
        self.part.is_none()
    }

    /// Encodes the change as its wire array.
    pub fn to_wire(&self) -> Value {
        Value::Array(vec![
            Value::String(self.table.clone()),
            self.pkey.to_value(),
            Value::String(self.state.as_str().to_string()),
            match &self.part {
                Some(part) => Value::Object(part.clone()),
                None => Value::Null,
            },
        ])
    }
}

impl From<ChangeTuple> for Change {
    fn from((table, pkey, state, part): ChangeTuple) -> Self {
        Self {
            table,
            pkey,
            state,
            part,
        }
    }
}

impl From<Change> for ChangeTuple {
    fn from(change: Change) -> Self {
        (change.table, change.pkey, change.state, change.part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn part(value: Value) -> Part {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn serializes_as_tuple() {
        let change = Change::new(
            "host",
            "h1",
            State::Current,
            Some(part(json!({"uuid": "h1"}))),
        );
        let text = serde_json::to_string(&change).unwrap();
        assert_eq!(text, r#"["host","h1","current",{"uuid":"h1"}]"#);
        assert_eq!(change.to_wire(), serde_json::from_str::<Value>(&text).unwrap());
    }

    #[test]
    fn decodes_composite_and_null() {
        let change: Change =
            serde_json::from_str(r#"["host_disk", ["h1", "d1"], "current", null]"#).unwrap();
        assert_eq!(change.pkey, PrimaryKey::composite(["h1", "d1"]));
        assert!(change.is_delete());
        assert_eq!(change.row_ref(), RowRef::new("host_disk", PrimaryKey::composite(["h1", "d1"])));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(serde_json::from_str::<Change>(r#"["host", "h1", "current"]"#).is_err());
    }

    #[test]
    fn row_ref_display() {
        assert_eq!(RowRef::new("nic", "aa:bb").to_string(), "nic/aa:bb");
    }
}
